// Copyright 2023 Remi Bernotavicius

//! Favorites, the shopping cart and author subscriptions.
//!
//! All three are (user, target) pairs with the same rules: only an authenticated user
//! may change them, a pair exists at most once (enforced by a unique index), and
//! removing a pair that does not exist is an error.

use crate::auth::Requester;
use crate::database::{self, models::*};
use crate::error::{unique_violation_as, Error, Result};
use crate::recipes;
use crate::users::{self, AuthorView};
use diesel::dsl::exists;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeList {
    Favorites,
    ShoppingCart,
}

impl RecipeList {
    fn duplicate_message(self) -> &'static str {
        match self {
            Self::Favorites => "recipe is already in favorites",
            Self::ShoppingCart => "recipe is already in the shopping cart",
        }
    }

    fn missing(self) -> Error {
        match self {
            Self::Favorites => Error::NotFound("favorite"),
            Self::ShoppingCart => Error::NotFound("shopping cart entry"),
        }
    }
}

pub fn add_recipe(
    conn: &mut database::Connection,
    requester: &Requester,
    list: RecipeList,
    new_recipe_id: RecipeId,
) -> Result<RecipeHandle> {
    use database::schema::{favorites, shopping_cart};
    use diesel::insert_into;

    let me = requester.user()?.id;
    let recipe = recipes::handle(conn, new_recipe_id)?;

    let inserted = match list {
        RecipeList::Favorites => insert_into(favorites::table)
            .values((
                favorites::user_id.eq(me),
                favorites::recipe_id.eq(recipe.id),
            ))
            .execute(conn),
        RecipeList::ShoppingCart => insert_into(shopping_cart::table)
            .values((
                shopping_cart::user_id.eq(me),
                shopping_cart::recipe_id.eq(recipe.id),
            ))
            .execute(conn),
    };
    unique_violation_as(inserted, Error::Duplicate(list.duplicate_message().into()))?;

    Ok(recipe)
}

pub fn remove_recipe(
    conn: &mut database::Connection,
    requester: &Requester,
    list: RecipeList,
    old_recipe_id: RecipeId,
) -> Result<()> {
    use database::schema::{favorites, shopping_cart};
    use diesel::delete;

    let me = requester.user()?.id;
    let recipe = recipes::handle(conn, old_recipe_id)?;

    let deleted = match list {
        RecipeList::Favorites => delete(
            favorites::table
                .filter(favorites::user_id.eq(me))
                .filter(favorites::recipe_id.eq(recipe.id)),
        )
        .execute(conn)?,
        RecipeList::ShoppingCart => delete(
            shopping_cart::table
                .filter(shopping_cart::user_id.eq(me))
                .filter(shopping_cart::recipe_id.eq(recipe.id)),
        )
        .execute(conn)?,
    };
    if deleted == 0 {
        return Err(list.missing());
    }
    Ok(())
}

pub fn contains(
    conn: &mut database::Connection,
    list: RecipeList,
    owner: UserId,
    target: RecipeId,
) -> Result<bool> {
    use database::schema::{favorites, shopping_cart};

    let found = match list {
        RecipeList::Favorites => diesel::select(exists(
            favorites::table
                .filter(favorites::user_id.eq(owner))
                .filter(favorites::recipe_id.eq(target)),
        ))
        .get_result(conn)?,
        RecipeList::ShoppingCart => diesel::select(exists(
            shopping_cart::table
                .filter(shopping_cart::user_id.eq(owner))
                .filter(shopping_cart::recipe_id.eq(target)),
        ))
        .get_result(conn)?,
    };
    Ok(found)
}

pub fn subscribe(
    conn: &mut database::Connection,
    requester: &Requester,
    new_author_id: UserId,
    recipes_limit: i64,
) -> Result<AuthorView> {
    use database::schema::subscriptions::dsl::*;
    use diesel::insert_into;

    let me = requester.user()?.id;
    if me == new_author_id {
        return Err(Error::SelfReference);
    }
    let author = users::get(conn, new_author_id)?;

    unique_violation_as(
        insert_into(subscriptions)
            .values((user_id.eq(me), author_id.eq(author.id)))
            .execute(conn),
        Error::Duplicate("already subscribed to this author".into()),
    )?;

    users::author_view(conn, requester, author, recipes_limit)
}

pub fn unsubscribe(
    conn: &mut database::Connection,
    requester: &Requester,
    old_author_id: UserId,
) -> Result<()> {
    use database::schema::subscriptions::dsl::*;
    use diesel::delete;

    let me = requester.user()?.id;
    let author = users::get(conn, old_author_id)?;

    let deleted = delete(
        subscriptions
            .filter(user_id.eq(me))
            .filter(author_id.eq(author.id)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(Error::NotFound("subscription"));
    }
    Ok(())
}

pub fn is_subscribed(
    conn: &mut database::Connection,
    follower: UserId,
    followee: UserId,
) -> Result<bool> {
    use database::schema::subscriptions::dsl::*;

    Ok(diesel::select(exists(
        subscriptions
            .filter(user_id.eq(follower))
            .filter(author_id.eq(followee)),
    ))
    .get_result(conn)?)
}

#[test]
fn recipe_lists_reject_duplicates() {
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let eater = kitchen.requester(&mut conn, "eater");

    for list in [RecipeList::Favorites, RecipeList::ShoppingCart] {
        let added = add_recipe(&mut conn, &eater, list, recipe.id).unwrap();
        assert_eq!(added.id, recipe.id);
        assert!(contains(&mut conn, list, eater.user_id().unwrap(), recipe.id).unwrap());

        let again = add_recipe(&mut conn, &eater, list, recipe.id);
        assert!(matches!(again, Err(Error::Duplicate(_))));
        assert_eq!(count_rows(&mut conn, list), 1);
    }
}

#[cfg(test)]
fn count_rows(conn: &mut database::Connection, list: RecipeList) -> i64 {
    use database::schema::{favorites, shopping_cart};

    match list {
        RecipeList::Favorites => favorites::table.count().get_result(conn).unwrap(),
        RecipeList::ShoppingCart => shopping_cart::table.count().get_result(conn).unwrap(),
    }
}

#[test]
fn removing_missing_entries() {
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let eater = kitchen.requester(&mut conn, "eater");

    for list in [RecipeList::Favorites, RecipeList::ShoppingCart] {
        assert!(matches!(
            remove_recipe(&mut conn, &eater, list, recipe.id),
            Err(Error::NotFound(_))
        ));

        add_recipe(&mut conn, &eater, list, recipe.id).unwrap();
        remove_recipe(&mut conn, &eater, list, recipe.id).unwrap();
        assert_eq!(count_rows(&mut conn, list), 0);
    }

    assert!(matches!(
        add_recipe(&mut conn, &eater, RecipeList::Favorites, RecipeId::new(999)),
        Err(Error::NotFound("recipe"))
    ));
}

#[test]
fn anonymous_cannot_change_relations() {
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let recipe = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let anonymous = Requester::Anonymous;

    for list in [RecipeList::Favorites, RecipeList::ShoppingCart] {
        assert!(matches!(
            add_recipe(&mut conn, &anonymous, list, recipe.id),
            Err(Error::AuthenticationRequired)
        ));
        assert!(matches!(
            remove_recipe(&mut conn, &anonymous, list, recipe.id),
            Err(Error::AuthenticationRequired)
        ));
        assert_eq!(count_rows(&mut conn, list), 0);
    }

    let author_id = kitchen.author.user_id().unwrap();
    assert!(matches!(
        subscribe(&mut conn, &anonymous, author_id, 3),
        Err(Error::AuthenticationRequired)
    ));
    assert!(matches!(
        unsubscribe(&mut conn, &anonymous, author_id),
        Err(Error::AuthenticationRequired)
    ));
}

#[test]
fn subscriptions_follow_the_rules() {
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let author_id = kitchen.author.user_id().unwrap();
    kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let fan = kitchen.requester(&mut conn, "fan");
    let fan_id = fan.user_id().unwrap();

    assert!(matches!(
        subscribe(&mut conn, &fan, fan_id, 3),
        Err(Error::SelfReference)
    ));
    assert!(matches!(
        unsubscribe(&mut conn, &fan, author_id),
        Err(Error::NotFound("subscription"))
    ));

    let view = subscribe(&mut conn, &fan, author_id, 3).unwrap();
    assert!(view.user.is_subscribed);
    assert_eq!(view.recipes_count, 1);
    assert!(is_subscribed(&mut conn, fan_id, author_id).unwrap());

    assert!(matches!(
        subscribe(&mut conn, &fan, author_id, 3),
        Err(Error::Duplicate(_))
    ));
    let rows: i64 = database::schema::subscriptions::table
        .filter(database::schema::subscriptions::user_id.eq(fan_id))
        .filter(database::schema::subscriptions::author_id.eq(author_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(rows, 1);
    assert!(matches!(
        subscribe(&mut conn, &fan, fan_id, 3),
        Err(Error::SelfReference)
    ));
    assert!(matches!(
        subscribe(&mut conn, &fan, UserId::new(999), 3),
        Err(Error::NotFound("user"))
    ));

    unsubscribe(&mut conn, &fan, author_id).unwrap();
    assert!(!is_subscribed(&mut conn, fan_id, author_id).unwrap());
}

#[test]
fn subscriptions_listing() {
    use crate::pagination::PageRequest;
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let author_id = kitchen.author.user_id().unwrap();
    for _ in 0..4 {
        kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 1)]);
    }
    let fan = kitchen.requester(&mut conn, "fan");
    subscribe(&mut conn, &fan, author_id, 3).unwrap();

    let page = users::subscriptions(&mut conn, &fan, PageRequest::new(None, None, 6).unwrap(), 2)
        .unwrap();
    assert_eq!(page.count, 1);
    let entry = &page.results[0];
    assert_eq!(entry.user.id, author_id);
    assert!(entry.user.is_subscribed);
    assert_eq!(entry.recipes.len(), 2);
    assert_eq!(entry.recipes_count, 4);

    assert!(matches!(
        users::subscriptions(
            &mut conn,
            &Requester::Anonymous,
            PageRequest::new(None, None, 6).unwrap(),
            2
        ),
        Err(Error::AuthenticationRequired)
    ));
}
