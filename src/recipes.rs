// Copyright 2023 Remi Bernotavicius

//! Recipe authoring: creating, replacing and deleting recipes together with their
//! ingredient and tag associations, plus the denormalized read view.

use crate::auth::Requester;
use crate::database::{self, models::*};
use crate::error::{unique_violation_as, Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::relations::{self, RecipeList};
use crate::users::{self, UserView};
use diesel::prelude::Connection as _;
use diesel::prelude::OptionalExtension as _;
use diesel::sqlite::Sqlite;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

const MAX_NAME_LENGTH: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IngredientAmount {
    pub id: IngredientId,
    pub amount: i32,
}

/// A recipe as submitted by its author. `image` may be left out when updating, in
/// which case the stored image is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeInput {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    #[serde(default)]
    pub image: Option<String>,
    pub tags: Vec<TagId>,
    pub ingredients: Vec<IngredientAmount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientView {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeView {
    pub id: RecipeId,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<IngredientView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<UserId>,
    /// Tag slugs; a recipe matches if it carries all of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

impl RecipeInput {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(Error::validation(format!(
                "name must be between 1 and {MAX_NAME_LENGTH} characters"
            )));
        }
        if self.text.trim().is_empty() {
            return Err(Error::validation("text must not be empty"));
        }
        if self.cooking_time < 1 {
            return Err(Error::validation("cooking_time must be at least 1"));
        }
        if let Some(image) = &self.image {
            if image.is_empty() {
                return Err(Error::validation("image must not be empty"));
            }
        }

        if self.ingredients.is_empty() {
            return Err(Error::validation("a recipe needs at least one ingredient"));
        }
        let mut seen = HashSet::new();
        for i in &self.ingredients {
            if i.amount < 1 {
                return Err(Error::validation("ingredient amount must be at least 1"));
            }
            if !seen.insert(i.id) {
                return Err(Error::validation(format!(
                    "ingredient {} is listed more than once",
                    i.id
                )));
            }
        }

        if self.tags.is_empty() {
            return Err(Error::validation("a recipe needs at least one tag"));
        }
        let mut seen = HashSet::new();
        for t in &self.tags {
            if !seen.insert(*t) {
                return Err(Error::validation(format!("tag {t} is listed more than once")));
            }
        }
        Ok(())
    }
}

fn check_references_exist(conn: &mut database::Connection, input: &RecipeInput) -> Result<()> {
    use database::schema::{ingredients, tags};

    let ingredient_ids: Vec<_> = input.ingredients.iter().map(|i| i.id).collect();
    let found: i64 = ingredients::table
        .filter(ingredients::id.eq_any(ingredient_ids.clone()))
        .count()
        .get_result(conn)?;
    if found != ingredient_ids.len() as i64 {
        return Err(Error::validation("recipe references an unknown ingredient"));
    }

    let found: i64 = tags::table
        .filter(tags::id.eq_any(input.tags.clone()))
        .count()
        .get_result(conn)?;
    if found != input.tags.len() as i64 {
        return Err(Error::validation("recipe references an unknown tag"));
    }
    Ok(())
}

/// Discards every association of `target` and inserts the submitted ones.
fn replace_associations(
    conn: &mut database::Connection,
    target: RecipeId,
    input: &RecipeInput,
) -> Result<()> {
    use database::schema::{recipe_ingredients, recipe_tags};
    use diesel::{delete, insert_into};

    delete(recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(target)))
        .execute(conn)?;
    delete(recipe_tags::table.filter(recipe_tags::recipe_id.eq(target))).execute(conn)?;

    let usages: Vec<_> = input
        .ingredients
        .iter()
        .map(|i| IngredientUsage {
            recipe_id: target,
            ingredient_id: i.id,
            amount: i.amount,
        })
        .collect();
    let tag_rows: Vec<_> = input
        .tags
        .iter()
        .map(|&tag_id| RecipeTag {
            recipe_id: target,
            tag_id,
        })
        .collect();

    unique_violation_as(
        insert_into(recipe_ingredients::table)
            .values(&usages)
            .execute(conn),
        Error::validation("ingredient is listed more than once"),
    )?;
    unique_violation_as(
        insert_into(recipe_tags::table)
            .values(&tag_rows)
            .execute(conn),
        Error::validation("tag is listed more than once"),
    )?;
    Ok(())
}

pub fn create(
    conn: &mut database::Connection,
    requester: &Requester,
    input: &RecipeInput,
) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;
    use diesel::insert_into;

    let author = requester.user()?.id;
    input.validate()?;
    let new_image = input
        .image
        .as_deref()
        .ok_or_else(|| Error::validation("image is required"))?;

    let recipe = conn.transaction(|conn| {
        check_references_exist(conn, input)?;
        let recipe = insert_into(recipes)
            .values((
                author_id.eq(author),
                name.eq(&input.name),
                image.eq(new_image),
                text.eq(&input.text),
                cooking_time.eq(input.cooking_time),
                created.eq(chrono::Utc::now().naive_utc()),
            ))
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        replace_associations(conn, recipe.id, input)?;
        Ok::<_, Error>(recipe)
    })?;

    log::info!("user {author} created recipe {} {:?}", recipe.id, recipe.name);
    Ok(recipe)
}

pub fn update(
    conn: &mut database::Connection,
    requester: &Requester,
    recipe_id: RecipeId,
    input: &RecipeInput,
) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;
    use diesel::update;

    let me = requester.user()?.id;
    let existing = get(conn, recipe_id)?;
    if existing.author_id != me {
        return Err(Error::Forbidden);
    }
    input.validate()?;
    let new_image = input.image.clone().unwrap_or(existing.image);

    let recipe = conn.transaction(|conn| {
        check_references_exist(conn, input)?;
        let recipe = update(recipes.find(existing.id))
            .set((
                name.eq(&input.name),
                image.eq(&new_image),
                text.eq(&input.text),
                cooking_time.eq(input.cooking_time),
            ))
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        replace_associations(conn, recipe.id, input)?;
        Ok::<_, Error>(recipe)
    })?;

    log::info!("user {me} updated recipe {}", recipe.id);
    Ok(recipe)
}

pub fn delete(
    conn: &mut database::Connection,
    requester: &Requester,
    recipe_id: RecipeId,
) -> Result<()> {
    use database::schema::recipes::dsl::*;

    let me = requester.user()?.id;
    let existing = get(conn, recipe_id)?;
    if existing.author_id != me {
        return Err(Error::Forbidden);
    }

    diesel::delete(recipes.find(existing.id)).execute(conn)?;
    log::info!("user {me} deleted recipe {}", existing.id);
    Ok(())
}

pub fn get(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .first(conn)
        .optional()?
        .ok_or(Error::NotFound("recipe"))
}

pub fn handle(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<RecipeHandle> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(RecipeHandle::as_select())
        .first(conn)
        .optional()?
        .ok_or(Error::NotFound("recipe"))
}

pub fn ingredient_usages(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
) -> Result<Vec<IngredientView>> {
    use database::schema::{ingredients, recipe_ingredients};

    let rows: Vec<(Ingredient, i32)> = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq(recipe_id))
        .select((Ingredient::as_select(), recipe_ingredients::amount))
        .order(recipe_ingredients::id.asc())
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(i, amount)| IngredientView {
            id: i.id,
            name: i.name,
            measurement_unit: i.measurement_unit,
            amount,
        })
        .collect())
}

pub fn tags_of(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Vec<Tag>> {
    use database::schema::{recipe_tags, tags};

    Ok(recipe_tags::table
        .inner_join(tags::table)
        .filter(recipe_tags::recipe_id.eq(recipe_id))
        .select(Tag::as_select())
        .order(tags::id.asc())
        .load(conn)?)
}

pub fn view(
    conn: &mut database::Connection,
    requester: &Requester,
    recipe: Recipe,
) -> Result<RecipeView> {
    let author = users::get(conn, recipe.author_id)?;
    let (is_favorited, is_in_shopping_cart) = match requester.user_id() {
        Some(me) => (
            relations::contains(conn, RecipeList::Favorites, me, recipe.id)?,
            relations::contains(conn, RecipeList::ShoppingCart, me, recipe.id)?,
        ),
        None => (false, false),
    };

    Ok(RecipeView {
        id: recipe.id,
        tags: tags_of(conn, recipe.id)?,
        author: users::view(conn, requester, author)?,
        ingredients: ingredient_usages(conn, recipe.id)?,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

fn filtered(
    filter: &RecipeFilter,
    tag_ids: &[TagId],
    me: Option<UserId>,
) -> database::schema::recipes::BoxedQuery<'static, Sqlite> {
    use database::schema::{favorites, recipe_tags, recipes, shopping_cart};

    let mut query = recipes::table.into_boxed();
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    for &tag in tag_ids {
        query = query.filter(
            recipes::id.eq_any(
                recipe_tags::table
                    .filter(recipe_tags::tag_id.eq(tag))
                    .select(recipe_tags::recipe_id),
            ),
        );
    }
    if let Some(me) = me {
        if filter.is_favorited {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(me))
                        .select(favorites::recipe_id),
                ),
            );
        }
        if filter.is_in_shopping_cart {
            query = query.filter(
                recipes::id.eq_any(
                    shopping_cart::table
                        .filter(shopping_cart::user_id.eq(me))
                        .select(shopping_cart::recipe_id),
                ),
            );
        }
    }
    query
}

/// Newest recipes first. The favorite and cart filters only apply to signed-in
/// requesters; anonymous requesters see them ignored.
pub fn list(
    conn: &mut database::Connection,
    requester: &Requester,
    filter: &RecipeFilter,
    page: PageRequest,
) -> Result<Page<RecipeView>> {
    use database::schema::{recipes, tags};

    let slugs: BTreeSet<String> = filter.tags.iter().cloned().collect();
    let tag_ids: Vec<TagId> = if slugs.is_empty() {
        vec![]
    } else {
        tags::table
            .filter(tags::slug.eq_any(slugs.iter().cloned().collect::<Vec<_>>()))
            .select(tags::id)
            .load(conn)?
    };
    // A recipe has to carry every requested tag, so an unknown slug matches nothing.
    if tag_ids.len() < slugs.len() {
        return Ok(Page::new(page, 0, vec![]));
    }
    let me = requester.user_id();

    let count: i64 = filtered(filter, &tag_ids, me).count().get_result(conn)?;
    let found = filtered(filter, &tag_ids, me)
        .select(Recipe::as_select())
        .order((recipes::created.desc(), recipes::id.desc()))
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    let results = found
        .into_iter()
        .map(|r| view(conn, requester, r))
        .collect::<Result<_>>()?;
    Ok(Page::new(page, count, results))
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use diesel::insert_into;

    /// A database seeded with an author and a tag, for building recipes in tests.
    pub struct Kitchen {
        pub author: Requester,
        pub tag: TagId,
    }

    impl Kitchen {
        pub fn new(conn: &mut database::Connection) -> Self {
            let author = Self::register(conn, "author");
            let tag = tag(conn, "Breakfast", "#E26C2D", "breakfast");
            Self { author, tag }
        }

        fn register(conn: &mut database::Connection, name: &str) -> Requester {
            Requester::User(users::register(conn, &users::new_user(name)).unwrap())
        }

        pub fn requester(&self, conn: &mut database::Connection, name: &str) -> Requester {
            Self::register(conn, name)
        }

        pub fn input(&self, conn: &mut database::Connection, items: &[(&str, i32)]) -> RecipeInput {
            RecipeInput {
                name: "Soup".into(),
                text: "Boil everything.".into(),
                cooking_time: 10,
                image: Some("data:image/png;base64,AAAA".into()),
                tags: vec![self.tag],
                ingredients: items
                    .iter()
                    .map(|&(n, amount)| IngredientAmount {
                        id: ingredient(conn, n, "g"),
                        amount,
                    })
                    .collect(),
            }
        }

        pub fn recipe(
            &self,
            conn: &mut database::Connection,
            author: &Requester,
            items: &[(&str, i32)],
        ) -> Recipe {
            let input = self.input(conn, items);
            create(conn, author, &input).unwrap()
        }
    }

    pub fn ingredient(conn: &mut database::Connection, new_name: &str, unit: &str) -> IngredientId {
        use database::schema::ingredients::dsl::*;

        insert_into(ingredients)
            .values((name.eq(new_name), measurement_unit.eq(unit)))
            .on_conflict_do_nothing()
            .execute(conn)
            .unwrap();
        ingredients
            .filter(name.eq(new_name))
            .filter(measurement_unit.eq(unit))
            .select(id)
            .first(conn)
            .unwrap()
    }

    pub fn tag(conn: &mut database::Connection, new_name: &str, new_color: &str, new_slug: &str) -> TagId {
        use database::schema::tags::dsl::*;

        insert_into(tags)
            .values((name.eq(new_name), color.eq(new_color), slug.eq(new_slug)))
            .returning(id)
            .get_result(conn)
            .unwrap()
    }
}

#[cfg(test)]
fn association_counts(conn: &mut database::Connection) -> (i64, i64, i64) {
    use database::schema::{recipe_ingredients, recipe_tags, recipes};

    (
        recipes::table.count().get_result(conn).unwrap(),
        recipe_ingredients::table.count().get_result(conn).unwrap(),
        recipe_tags::table.count().get_result(conn).unwrap(),
    )
}

#[test]
fn create_persists_exact_associations() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let lunch = tag(&mut conn, "Lunch", "#49B64E", "lunch");
    let mut input = kitchen.input(&mut conn, &[("Salt", 10), ("Pepper", 2)]);
    input.tags.push(lunch);

    let recipe = create(&mut conn, &kitchen.author, &input).unwrap();
    assert_eq!(recipe.cooking_time, 10);
    assert_eq!(recipe.author_id, kitchen.author.user_id().unwrap());

    let stored: Vec<(IngredientId, i32)> = ingredient_usages(&mut conn, recipe.id)
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.amount))
        .collect();
    let submitted: Vec<(IngredientId, i32)> =
        input.ingredients.iter().map(|i| (i.id, i.amount)).collect();
    assert_eq!(stored, submitted);

    let stored_tags: Vec<TagId> = tags_of(&mut conn, recipe.id)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(stored_tags, vec![kitchen.tag, lunch]);
}

#[test]
fn create_rejects_invalid_input_and_persists_nothing() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let valid = kitchen.input(&mut conn, &[("Salt", 10)]);
    let salt = valid.ingredients[0].id;

    let mut repeated_ingredient = valid.clone();
    repeated_ingredient.ingredients.push(IngredientAmount { id: salt, amount: 3 });

    let mut repeated_tag = valid.clone();
    repeated_tag.tags.push(kitchen.tag);

    let mut zero_time = valid.clone();
    zero_time.cooking_time = 0;

    let mut zero_amount = valid.clone();
    zero_amount.ingredients[0].amount = 0;

    let mut unknown_ingredient = valid.clone();
    unknown_ingredient.ingredients.push(IngredientAmount {
        id: IngredientId::new(999),
        amount: 1,
    });

    let mut unknown_tag = valid.clone();
    unknown_tag.tags.push(TagId::new(999));

    let mut no_image = valid.clone();
    no_image.image = None;

    for bad in [
        repeated_ingredient,
        repeated_tag,
        zero_time,
        zero_amount,
        unknown_ingredient,
        unknown_tag,
        no_image,
    ] {
        assert!(
            matches!(create(&mut conn, &kitchen.author, &bad), Err(Error::Validation(_))),
            "{bad:?} should be rejected"
        );
        assert_eq!(association_counts(&mut conn), (0, 0, 0));
    }

    assert!(matches!(
        create(&mut conn, &Requester::Anonymous, &valid),
        Err(Error::AuthenticationRequired)
    ));
    assert_eq!(association_counts(&mut conn), (0, 0, 0));
}

#[test]
fn update_replaces_associations() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10), ("Pepper", 2)]);
    let dinner = tag(&mut conn, "Dinner", "#8775D2", "dinner");

    let mut input = kitchen.input(&mut conn, &[("Pepper", 5), ("Oil", 30)]);
    input.name = "Better soup".into();
    input.tags = vec![dinner];
    input.image = None;

    let updated = update(&mut conn, &kitchen.author, recipe.id, &input).unwrap();
    assert_eq!(updated.name, "Better soup");
    assert_eq!(updated.image, recipe.image);
    assert_eq!(updated.created, recipe.created);

    let stored: Vec<(String, i32)> = ingredient_usages(&mut conn, recipe.id)
        .unwrap()
        .into_iter()
        .map(|i| (i.name, i.amount))
        .collect();
    assert_eq!(stored, vec![("Pepper".into(), 5), ("Oil".into(), 30)]);
    let stored_tags: Vec<TagId> = tags_of(&mut conn, recipe.id)
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(stored_tags, vec![dinner]);
    assert_eq!(association_counts(&mut conn), (1, 2, 1));
}

#[test]
fn only_the_author_may_change_a_recipe() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let stranger = kitchen.requester(&mut conn, "stranger");
    let input = kitchen.input(&mut conn, &[("Sugar", 1)]);

    assert!(matches!(
        update(&mut conn, &stranger, recipe.id, &input),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        delete(&mut conn, &stranger, recipe.id),
        Err(Error::Forbidden)
    ));
    assert!(matches!(
        update(&mut conn, &Requester::Anonymous, recipe.id, &input),
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        update(&mut conn, &kitchen.author, RecipeId::new(999), &input),
        Err(Error::NotFound("recipe"))
    ));
    assert_eq!(get(&mut conn, recipe.id).unwrap(), recipe);
}

#[test]
fn delete_cascades_to_associations() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10), ("Pepper", 2)]);
    let eater = kitchen.requester(&mut conn, "eater");
    relations::add_recipe(&mut conn, &eater, RecipeList::ShoppingCart, recipe.id).unwrap();

    delete(&mut conn, &kitchen.author, recipe.id).unwrap();
    assert_eq!(association_counts(&mut conn), (0, 0, 0));
    assert!(!relations::contains(
        &mut conn,
        RecipeList::ShoppingCart,
        eater.user_id().unwrap(),
        recipe.id
    )
    .unwrap());
    assert!(matches!(get(&mut conn, recipe.id), Err(Error::NotFound(_))));
}

#[test]
fn view_is_relative_to_requester() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let eater = kitchen.requester(&mut conn, "eater");
    relations::add_recipe(&mut conn, &eater, RecipeList::Favorites, recipe.id).unwrap();

    let seen = view(&mut conn, &eater, recipe.clone()).unwrap();
    assert!(seen.is_favorited);
    assert!(!seen.is_in_shopping_cart);
    assert_eq!(
        seen.ingredients,
        vec![IngredientView {
            id: seen.ingredients[0].id,
            name: "Salt".into(),
            measurement_unit: "g".into(),
            amount: 10,
        }]
    );
    assert_eq!(seen.author.username, "author");

    let anonymous = view(&mut conn, &Requester::Anonymous, recipe).unwrap();
    assert!(!anonymous.is_favorited);
    assert!(!anonymous.is_in_shopping_cart);
    assert!(!anonymous.author.is_subscribed);
}

#[test]
fn list_filters_and_orders() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let lunch = tag(&mut conn, "Lunch", "#49B64E", "lunch");
    let other = kitchen.requester(&mut conn, "other");

    let first = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 1)]);
    let mut lunch_input = kitchen.input(&mut conn, &[("Salt", 1)]);
    lunch_input.tags = vec![lunch];
    let second = create(&mut conn, &other, &lunch_input).unwrap();
    relations::add_recipe(&mut conn, &other, RecipeList::Favorites, first.id).unwrap();

    let page = PageRequest::new(None, None, 6).unwrap();
    let ids = |p: Page<RecipeView>| p.results.into_iter().map(|r| r.id).collect::<Vec<_>>();

    let all = list(&mut conn, &Requester::Anonymous, &RecipeFilter::default(), page).unwrap();
    assert_eq!(all.count, 2);
    assert_eq!(ids(all), vec![second.id, first.id]);

    let by_author = RecipeFilter {
        author: Some(kitchen.author.user_id().unwrap()),
        ..Default::default()
    };
    assert_eq!(
        ids(list(&mut conn, &Requester::Anonymous, &by_author, page).unwrap()),
        vec![first.id]
    );

    let by_tags = |conn: &mut database::Connection, slugs: &[&str]| {
        let filter = RecipeFilter {
            tags: slugs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        ids(list(conn, &Requester::Anonymous, &filter, page).unwrap())
    };
    assert_eq!(by_tags(&mut conn, &["lunch"]), vec![second.id]);
    assert_eq!(by_tags(&mut conn, &["lunch", "lunch"]), vec![second.id]);
    assert!(by_tags(&mut conn, &["lunch", "missing"]).is_empty());
    assert!(by_tags(&mut conn, &["breakfast", "lunch"]).is_empty());

    let favorites = RecipeFilter {
        is_favorited: true,
        ..Default::default()
    };
    assert_eq!(
        ids(list(&mut conn, &other, &favorites, page).unwrap()),
        vec![first.id]
    );
    assert_eq!(
        list(&mut conn, &Requester::Anonymous, &favorites, page)
            .unwrap()
            .count,
        2
    );

    let in_cart = RecipeFilter {
        is_in_shopping_cart: true,
        ..Default::default()
    };
    assert_eq!(list(&mut conn, &other, &in_cart, page).unwrap().count, 0);

    let small = PageRequest::new(Some(2), Some(1), 6).unwrap();
    let second_page = list(&mut conn, &Requester::Anonymous, &RecipeFilter::default(), small).unwrap();
    assert_eq!(second_page.previous, Some(1));
    assert_eq!(second_page.next, None);
    assert_eq!(ids(second_page), vec![first.id]);
}

#[test]
fn tag_filter_requires_every_tag() {
    use fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let lunch = tag(&mut conn, "Lunch", "#49B64E", "lunch");

    let breakfast_only = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 1)]);
    let mut both = kitchen.input(&mut conn, &[("Salt", 1)]);
    both.tags = vec![kitchen.tag, lunch];
    let both = create(&mut conn, &kitchen.author, &both).unwrap();

    let page = PageRequest::new(None, None, 6).unwrap();
    let matching = |conn: &mut database::Connection, slugs: &[&str]| {
        let filter = RecipeFilter {
            tags: slugs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let found = list(conn, &Requester::Anonymous, &filter, page).unwrap();
        assert_eq!(found.count, found.results.len() as i64);
        found.results.into_iter().map(|r| r.id).collect::<Vec<_>>()
    };

    assert_eq!(
        matching(&mut conn, &["breakfast"]),
        vec![both.id, breakfast_only.id]
    );
    assert_eq!(matching(&mut conn, &["breakfast", "lunch"]), vec![both.id]);
    assert_eq!(matching(&mut conn, &["lunch", "breakfast"]), vec![both.id]);
    assert!(matching(&mut conn, &["breakfast", "dinner"]).is_empty());
}
