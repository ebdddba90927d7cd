// Copyright 2023 Remi Bernotavicius

use super::AppState;
use crate::auth::Requester;
use crate::catalog;
use crate::database::models::{IngredientId, RecipeId, TagId, UserId};
use crate::error::{Error, Result};
use crate::pagination::PageRequest;
use crate::recipes::{self, RecipeFilter, RecipeInput};
use crate::relations::{self, RecipeList};
use crate::shopping_list;
use crate::users::{self, NewUser};
use axum::{
    extract::{FromRequest, FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
        request::Parts,
        StatusCode,
    },
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::str::FromStr;

/// A JSON request body whose rejection is reported as a validation error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct Body<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct Params<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct Id<T>(T);

/// `Authorization: Token <key>` identifies the user. Without the header the request is
/// anonymous; a header carrying an unknown key is rejected outright.
impl FromRequestParts<AppState> for Requester {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self::Anonymous);
        };
        let key = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Token "))
            .map(|key| key.trim().to_owned())
            .ok_or(Error::AuthenticationRequired)?;

        let user = state
            .database
            .run(move |conn| users::user_for_token(conn, &key))
            .await?;
        user.map(Self::User).ok_or(Error::AuthenticationRequired)
    }
}

#[derive(Deserialize)]
pub struct PageParams {
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SubscriptionParams {
    page: Option<i64>,
    limit: Option<i64>,
    recipes_limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct IngredientParams {
    name: Option<String>,
}

#[derive(Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub struct PasswordChange {
    new_password: String,
    current_password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Body(new_user): Body<NewUser>,
) -> Result<impl IntoResponse> {
    let view = state
        .database
        .run(move |conn| {
            let user = users::register(conn, &new_user)?;
            users::view(conn, &Requester::Anonymous, user)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_users(
    State(state): State<AppState>,
    requester: Requester,
    Params(params): Params<PageParams>,
) -> Result<impl IntoResponse> {
    let page = PageRequest::new(params.page, params.limit, state.config.page_size)?;
    let page = state
        .database
        .run(move |conn| users::list(conn, &requester, page))
        .await?;
    Ok(Json(page))
}

pub async fn current_user(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<impl IntoResponse> {
    let me = requester.user()?.clone();
    let view = state
        .database
        .run(move |conn| users::view(conn, &requester, me))
        .await?;
    Ok(Json(view))
}

pub async fn get_user(
    State(state): State<AppState>,
    requester: Requester,
    Id(user_id): Id<UserId>,
) -> Result<impl IntoResponse> {
    let view = state
        .database
        .run(move |conn| {
            let user = users::get(conn, user_id)?;
            users::view(conn, &requester, user)
        })
        .await?;
    Ok(Json(view))
}

pub async fn set_password(
    State(state): State<AppState>,
    requester: Requester,
    Body(change): Body<PasswordChange>,
) -> Result<StatusCode> {
    state
        .database
        .run(move |conn| {
            users::set_password(
                conn,
                &requester,
                &change.current_password,
                &change.new_password,
            )
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscriptions(
    State(state): State<AppState>,
    requester: Requester,
    Params(params): Params<SubscriptionParams>,
) -> Result<impl IntoResponse> {
    let page = PageRequest::new(params.page, params.limit, state.config.page_size)?;
    let recipes_limit = params.recipes_limit.unwrap_or(state.config.recipes_limit);
    let page = state
        .database
        .run(move |conn| users::subscriptions(conn, &requester, page, recipes_limit))
        .await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
pub struct RecipesLimit {
    recipes_limit: Option<i64>,
}

pub async fn subscribe(
    State(state): State<AppState>,
    requester: Requester,
    Id(author_id): Id<UserId>,
    Params(params): Params<RecipesLimit>,
) -> Result<impl IntoResponse> {
    let recipes_limit = params.recipes_limit.unwrap_or(state.config.recipes_limit);
    if recipes_limit < 0 {
        return Err(Error::validation("recipes_limit must not be negative"));
    }
    let view = state
        .database
        .run(move |conn| relations::subscribe(conn, &requester, author_id, recipes_limit))
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    requester: Requester,
    Id(author_id): Id<UserId>,
) -> Result<StatusCode> {
    state
        .database
        .run(move |conn| relations::unsubscribe(conn, &requester, author_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn login(
    State(state): State<AppState>,
    Body(credentials): Body<Credentials>,
) -> Result<impl IntoResponse> {
    let token = state
        .database
        .run(move |conn| users::login(conn, &credentials.username, &credentials.password))
        .await?;
    Ok(Json(serde_json::json!({ "auth_token": token })))
}

pub async fn logout(State(state): State<AppState>, requester: Requester) -> Result<StatusCode> {
    state
        .database
        .run(move |conn| users::logout(conn, &requester))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.database.run(catalog::list_tags).await?))
}

pub async fn get_tag(
    State(state): State<AppState>,
    Id(tag_id): Id<TagId>,
) -> Result<impl IntoResponse> {
    let tag = state
        .database
        .run(move |conn| catalog::get_tag(conn, tag_id))
        .await?;
    Ok(Json(tag))
}

pub async fn search_ingredients(
    State(state): State<AppState>,
    Params(params): Params<IngredientParams>,
) -> Result<impl IntoResponse> {
    let found = state
        .database
        .run(move |conn| catalog::search_ingredients(conn, params.name.as_deref()))
        .await?;
    Ok(Json(found))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    Id(ingredient_id): Id<IngredientId>,
) -> Result<impl IntoResponse> {
    let ingredient = state
        .database
        .run(move |conn| catalog::get_ingredient(conn, ingredient_id))
        .await?;
    Ok(Json(ingredient))
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::validation(format!("invalid value {value:?} for {key}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::validation(format!(
            "{key} must be one of 0, 1, true or false"
        ))),
    }
}

/// Query strings repeat `tags`, so they are taken as raw pairs.
fn recipe_query(
    pairs: Vec<(String, String)>,
    default_limit: i64,
) -> Result<(RecipeFilter, PageRequest)> {
    let mut filter = RecipeFilter::default();
    let (mut page, mut limit) = (None, None);
    for (key, value) in pairs {
        match key.as_str() {
            "author" => filter.author = Some(UserId::new(parse_param(&key, &value)?)),
            "tags" => filter.tags.push(value),
            "is_favorited" => filter.is_favorited = parse_flag(&key, &value)?,
            "is_in_shopping_cart" | "in_shopping_cart" => {
                filter.is_in_shopping_cart = parse_flag(&key, &value)?
            }
            "page" => page = Some(parse_param(&key, &value)?),
            "limit" => limit = Some(parse_param(&key, &value)?),
            _ => {}
        }
    }
    Ok((filter, PageRequest::new(page, limit, default_limit)?))
}

pub async fn list_recipes(
    State(state): State<AppState>,
    requester: Requester,
    Params(pairs): Params<Vec<(String, String)>>,
) -> Result<impl IntoResponse> {
    let (filter, page) = recipe_query(pairs, state.config.page_size)?;
    let page = state
        .database
        .run(move |conn| recipes::list(conn, &requester, &filter, page))
        .await?;
    Ok(Json(page))
}

pub async fn create_recipe(
    State(state): State<AppState>,
    requester: Requester,
    Body(input): Body<RecipeInput>,
) -> Result<impl IntoResponse> {
    let view = state
        .database
        .run(move |conn| {
            let recipe = recipes::create(conn, &requester, &input)?;
            recipes::view(conn, &requester, recipe)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<impl IntoResponse> {
    let view = state
        .database
        .run(move |conn| {
            let recipe = recipes::get(conn, recipe_id)?;
            recipes::view(conn, &requester, recipe)
        })
        .await?;
    Ok(Json(view))
}

pub async fn update_recipe(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
    Body(input): Body<RecipeInput>,
) -> Result<impl IntoResponse> {
    let view = state
        .database
        .run(move |conn| {
            let recipe = recipes::update(conn, &requester, recipe_id, &input)?;
            recipes::view(conn, &requester, recipe)
        })
        .await?;
    Ok(Json(view))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<StatusCode> {
    state
        .database
        .run(move |conn| recipes::delete(conn, &requester, recipe_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_list(
    state: AppState,
    requester: Requester,
    list: RecipeList,
    recipe_id: RecipeId,
) -> Result<impl IntoResponse> {
    let handle = state
        .database
        .run(move |conn| relations::add_recipe(conn, &requester, list, recipe_id))
        .await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

async fn remove_from_list(
    state: AppState,
    requester: Requester,
    list: RecipeList,
    recipe_id: RecipeId,
) -> Result<StatusCode> {
    state
        .database
        .run(move |conn| relations::remove_recipe(conn, &requester, list, recipe_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<impl IntoResponse> {
    add_to_list(state, requester, RecipeList::Favorites, recipe_id).await
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<StatusCode> {
    remove_from_list(state, requester, RecipeList::Favorites, recipe_id).await
}

pub async fn add_to_shopping_cart(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<impl IntoResponse> {
    add_to_list(state, requester, RecipeList::ShoppingCart, recipe_id).await
}

pub async fn remove_from_shopping_cart(
    State(state): State<AppState>,
    requester: Requester,
    Id(recipe_id): Id<RecipeId>,
) -> Result<StatusCode> {
    remove_from_list(state, requester, RecipeList::ShoppingCart, recipe_id).await
}

pub async fn download_shopping_cart(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<impl IntoResponse> {
    let list = state
        .database
        .run(move |conn| shopping_list::shopping_list(conn, &requester))
        .await?;
    Ok((
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"shopping_cart.txt\""),
        ],
        list.to_string(),
    ))
}

#[test]
fn recipe_query_parsing() {
    let pairs = |items: &[(&str, &str)]| {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>()
    };

    let (filter, page) = recipe_query(
        pairs(&[
            ("tags", "breakfast"),
            ("tags", "lunch"),
            ("author", "3"),
            ("is_favorited", "1"),
            ("in_shopping_cart", "false"),
            ("page", "2"),
            ("unknown", "ignored"),
        ]),
        6,
    )
    .unwrap();
    assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
    assert_eq!(filter.author, Some(UserId::new(3)));
    assert!(filter.is_favorited);
    assert!(!filter.is_in_shopping_cart);
    assert_eq!(page, PageRequest { page: 2, limit: 6 });

    assert!(recipe_query(pairs(&[("author", "me")]), 6).is_err());
    assert!(recipe_query(pairs(&[("is_favorited", "yes")]), 6).is_err());
    assert!(recipe_query(pairs(&[("limit", "0")]), 6).is_err());
}
