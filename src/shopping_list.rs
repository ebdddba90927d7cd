// Copyright 2023 Remi Bernotavicius

use crate::auth::Requester;
use crate::database::{self, models::*};
use crate::error::Result;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use std::collections::BTreeMap;
use std::fmt;

/// Total amounts keyed by (ingredient name, measurement unit).
type Totals = BTreeMap<(String, String), i64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    pub owner: String,
    pub totals: Totals,
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shopping list for {}", self.owner)?;
        writeln!(f)?;
        for ((name, unit), amount) in &self.totals {
            writeln!(f, "{name}: {amount} {unit}")?;
        }
        Ok(())
    }
}

fn sum_by_ingredient(usages: Vec<(String, String, i32)>) -> Totals {
    let mut totals = Totals::new();
    for (name, unit, amount) in usages {
        *totals.entry((name, unit)).or_default() += i64::from(amount);
    }
    totals
}

/// Everything needed to cook every recipe in the requester's cart.
pub fn shopping_list(conn: &mut database::Connection, requester: &Requester) -> Result<ShoppingList> {
    use database::schema::{ingredients, recipe_ingredients, shopping_cart};

    let me = requester.user()?;

    let cart: Vec<RecipeId> = shopping_cart::table
        .filter(shopping_cart::user_id.eq(me.id))
        .select(shopping_cart::recipe_id)
        .load(conn)?;
    let usages: Vec<(String, String, i32)> = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(cart))
        .select((
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load(conn)?;

    Ok(ShoppingList {
        owner: me.username.clone(),
        totals: sum_by_ingredient(usages),
    })
}

#[test]
fn shopping_list_format() {
    use maplit::btreemap;

    let list = ShoppingList {
        owner: "alice".into(),
        totals: btreemap! {
            ("Pepper".to_string(), "g".to_string()) => 2,
            ("Milk".to_string(), "ml".to_string()) => 250,
        },
    };
    assert_eq!(
        list.to_string(),
        "Shopping list for alice\n\nMilk: 250 ml\nPepper: 2 g\n"
    );

    let empty = ShoppingList {
        owner: "bob".into(),
        totals: btreemap! {},
    };
    assert_eq!(empty.to_string(), "Shopping list for bob\n\n");
}

#[test]
fn sums_across_recipes() {
    use crate::recipes::fixtures::*;
    use crate::relations::{self, RecipeList};

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    let a = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);
    let b = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 5), ("Pepper", 2)]);
    let ignored = kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 100)]);
    let cook = kitchen.requester(&mut conn, "cook");

    for r in [a.id, b.id] {
        relations::add_recipe(&mut conn, &cook, RecipeList::ShoppingCart, r).unwrap();
    }
    relations::add_recipe(&mut conn, &kitchen.author, RecipeList::ShoppingCart, ignored.id)
        .unwrap();

    let list = shopping_list(&mut conn, &cook).unwrap();
    assert_eq!(list.owner, "cook");
    assert_eq!(
        list.totals,
        maplit::btreemap! {
            ("Pepper".to_string(), "g".to_string()) => 2,
            ("Salt".to_string(), "g".to_string()) => 15,
        }
    );
    assert_eq!(
        list.to_string(),
        "Shopping list for cook\n\nPepper: 2 g\nSalt: 15 g\n"
    );
}

#[test]
fn same_name_different_units_stay_apart() {
    let totals = sum_by_ingredient(vec![
        ("Milk".into(), "ml".into(), 200),
        ("Milk".into(), "cup".into(), 1),
        ("Milk".into(), "ml".into(), 50),
    ]);
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[&("Milk".to_string(), "ml".to_string())], 250);
    assert_eq!(totals[&("Milk".to_string(), "cup".to_string())], 1);
}

#[test]
fn empty_cart_has_no_rows() {
    use crate::recipes::fixtures::*;

    let mut conn = database::establish_in_memory().unwrap();
    let kitchen = Kitchen::new(&mut conn);
    kitchen.recipe(&mut conn, &kitchen.author, &[("Salt", 10)]);

    let list = shopping_list(&mut conn, &kitchen.author).unwrap();
    assert!(list.totals.is_empty());
    assert_eq!(list.to_string(), "Shopping list for author\n\n");
}

#[test]
fn anonymous_has_no_shopping_list() {
    use crate::error::Error;

    let mut conn = database::establish_in_memory().unwrap();
    assert!(matches!(
        shopping_list(&mut conn, &Requester::Anonymous),
        Err(Error::AuthenticationRequired)
    ));
}
