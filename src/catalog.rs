// Copyright 2023 Remi Bernotavicius

//! Read-mostly reference data: ingredients and tags.

use crate::database::{self, models::*};
use crate::error::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::Deserialize;

const MAX_SLUG_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl NewIngredient {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("ingredient name must not be empty"));
        }
        if self.measurement_unit.trim().is_empty() {
            return Err(Error::validation(format!(
                "ingredient {:?} has no measurement unit",
                self.name
            )));
        }
        Ok(())
    }
}

impl NewTag {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("tag name must not be empty"));
        }
        let hex = self.color.strip_prefix('#').unwrap_or_default();
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation(format!(
                "tag color {:?} is not a #RRGGBB value",
                self.color
            )));
        }
        if self.slug.is_empty()
            || self.slug.len() > MAX_SLUG_LENGTH
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::validation(format!("invalid tag slug {:?}", self.slug)));
        }
        Ok(())
    }
}

pub fn list_tags(conn: &mut database::Connection) -> Result<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags.select(Tag::as_select()).order(id.asc()).load(conn)?)
}

pub fn get_tag(conn: &mut database::Connection, tag_id: TagId) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    tags.find(tag_id)
        .select(Tag::as_select())
        .first(conn)
        .optional()?
        .ok_or(Error::NotFound("tag"))
}

/// Ingredients whose name starts with `prefix`, compared case-sensitively.
pub fn search_ingredients(
    conn: &mut database::Connection,
    prefix: Option<&str>,
) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::expression_methods::EscapeExpressionMethods as _;
    use diesel::expression_methods::TextExpressionMethods as _;

    let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
        return Ok(ingredients
            .select(Ingredient::as_select())
            .order(name.asc())
            .load(conn)?);
    };

    // LIKE folds ASCII case in SQLite, so it only narrows the candidates.
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(name.like(format!("{escaped}%")).escape('\\'))
        .order(name.asc())
        .load(conn)?
        .into_iter()
        .filter(|i| i.name.starts_with(prefix))
        .collect())
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .first(conn)
        .optional()?
        .ok_or(Error::NotFound("ingredient"))
}

/// Inserts the ingredients that are not present yet, returning how many were new.
pub fn add_ingredients(
    conn: &mut database::Connection,
    new_ingredients: &[NewIngredient],
) -> Result<usize> {
    use database::schema::ingredients::dsl::*;
    use diesel::insert_or_ignore_into;

    let mut added = 0;
    for i in new_ingredients {
        i.validate()?;
        added += insert_or_ignore_into(ingredients)
            .values((name.eq(&i.name), measurement_unit.eq(&i.measurement_unit)))
            .execute(conn)?;
    }
    Ok(added)
}

/// Inserts a tag unless one with the same slug exists. Returns whether it was new.
pub fn add_tag(conn: &mut database::Connection, new_tag: &NewTag) -> Result<bool> {
    use database::schema::tags::dsl::*;
    use diesel::dsl::exists;
    use diesel::insert_into;

    new_tag.validate()?;
    let present: bool = diesel::select(exists(tags.filter(slug.eq(&new_tag.slug)))).get_result(conn)?;
    if present {
        return Ok(false);
    }

    crate::error::unique_violation_as(
        insert_into(tags)
            .values((
                name.eq(&new_tag.name),
                color.eq(&new_tag.color),
                slug.eq(&new_tag.slug),
            ))
            .execute(conn),
        Error::validation(format!(
            "tag {:?} clashes with an existing tag name or color",
            new_tag.name
        )),
    )?;
    Ok(true)
}

#[cfg(test)]
fn ingredient(name: &str, unit: &str) -> NewIngredient {
    NewIngredient {
        name: name.into(),
        measurement_unit: unit.into(),
    }
}

#[test]
fn ingredient_prefix_search_is_case_sensitive() {
    let mut conn = database::establish_in_memory().unwrap();
    let added = add_ingredients(
        &mut conn,
        &[
            ingredient("Salt", "g"),
            ingredient("salt flakes", "g"),
            ingredient("Sugar", "g"),
            ingredient("100%_juice", "ml"),
            ingredient("Salt", "g"),
        ],
    )
    .unwrap();
    assert_eq!(added, 4);

    let names = |found: Vec<Ingredient>| found.into_iter().map(|i| i.name).collect::<Vec<_>>();

    assert_eq!(names(search_ingredients(&mut conn, Some("Sa")).unwrap()), vec!["Salt"]);
    assert_eq!(
        names(search_ingredients(&mut conn, Some("sa")).unwrap()),
        vec!["salt flakes"]
    );
    assert_eq!(
        names(search_ingredients(&mut conn, Some("100%_")).unwrap()),
        vec!["100%_juice"]
    );
    assert!(search_ingredients(&mut conn, Some("100_")).unwrap().is_empty());
    assert_eq!(search_ingredients(&mut conn, None).unwrap().len(), 4);
    assert_eq!(search_ingredients(&mut conn, Some("")).unwrap().len(), 4);
}

#[test]
fn catalog_lookups() {
    let mut conn = database::establish_in_memory().unwrap();
    add_ingredients(&mut conn, &[ingredient("Salt", "g")]).unwrap();
    let salt = search_ingredients(&mut conn, Some("Salt")).unwrap().remove(0);
    assert_eq!(get_ingredient(&mut conn, salt.id).unwrap(), salt);
    assert!(matches!(
        get_ingredient(&mut conn, IngredientId::new(999)),
        Err(Error::NotFound("ingredient"))
    ));

    let breakfast = NewTag {
        name: "Breakfast".into(),
        color: "#E26C2D".into(),
        slug: "breakfast".into(),
    };
    assert!(add_tag(&mut conn, &breakfast).unwrap());
    assert!(!add_tag(&mut conn, &breakfast).unwrap());

    let tags = list_tags(&mut conn).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(get_tag(&mut conn, tags[0].id).unwrap().slug, "breakfast");
    assert!(matches!(
        get_tag(&mut conn, TagId::new(999)),
        Err(Error::NotFound("tag"))
    ));
}

#[test]
fn tag_validation() {
    let good = NewTag {
        name: "Lunch".into(),
        color: "#49B64E".into(),
        slug: "lunch".into(),
    };
    good.validate().unwrap();

    for bad in [
        NewTag {
            color: "green".into(),
            ..good.clone()
        },
        NewTag {
            color: "#49B64".into(),
            ..good.clone()
        },
        NewTag {
            slug: "has space".into(),
            ..good.clone()
        },
        NewTag {
            name: "".into(),
            ..good.clone()
        },
    ] {
        assert!(bad.validate().is_err(), "{bad:?} should be rejected");
    }
}
