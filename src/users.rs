// Copyright 2023 Remi Bernotavicius

//! Accounts, token sessions and the public views of a user.

use crate::auth::{self, Requester};
use crate::database::{self, models::*};
use crate::error::{unique_violation_as, Error, Result};
use crate::pagination::{Page, PageRequest};
use crate::relations;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};

const MAX_NAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

/// A followed author together with a preview of their recipes.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeHandle>,
    pub recipes_count: i64,
}

fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(format!(
            "username must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || ".@+-_".contains(c))
    {
        return Err(Error::validation(
            "username may only contain letters, digits and .@+-_",
        ));
    }
    if username.eq_ignore_ascii_case("me") {
        return Err(Error::validation("username \"me\" is reserved"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

impl NewUser {
    fn validate(&self) -> Result<()> {
        validate_username(&self.username)?;
        if self.email.is_empty()
            || self.email.chars().count() > MAX_EMAIL_LENGTH
            || !self.email.contains('@')
        {
            return Err(Error::validation("enter a valid email address"));
        }
        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
        ] {
            if value.trim().is_empty() || value.chars().count() > MAX_NAME_LENGTH {
                return Err(Error::validation(format!(
                    "{field} must be between 1 and {MAX_NAME_LENGTH} characters"
                )));
            }
        }
        validate_password(&self.password)
    }
}

pub fn register(conn: &mut database::Connection, new_user: &NewUser) -> Result<User> {
    use database::schema::users::dsl::*;
    use diesel::insert_into;

    new_user.validate()?;

    let hashed = auth::hash_password(&new_user.password);
    let row = NewUserRow {
        email: &new_user.email,
        username: &new_user.username,
        first_name: &new_user.first_name,
        last_name: &new_user.last_name,
        password_hash: &hashed,
    };
    let user = unique_violation_as(
        insert_into(users)
            .values(row)
            .returning(User::as_returning())
            .get_result(conn),
        Error::validation("a user with that username or email already exists"),
    )?;

    log::info!("registered user {} ({})", user.username, user.id);
    Ok(user)
}

pub fn get(conn: &mut database::Connection, user_id: UserId) -> Result<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or(Error::NotFound("user"))
}

pub fn view(conn: &mut database::Connection, requester: &Requester, user: User) -> Result<UserView> {
    let is_subscribed = match requester.user_id() {
        Some(me) => relations::is_subscribed(conn, me, user.id)?,
        None => false,
    };
    Ok(UserView {
        id: user.id,
        email: user.email,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_subscribed,
    })
}

pub fn list(
    conn: &mut database::Connection,
    requester: &Requester,
    page: PageRequest,
) -> Result<Page<UserView>> {
    use database::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    let found = users
        .select(User::as_select())
        .order(id.asc())
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    let results = found
        .into_iter()
        .map(|u| view(conn, requester, u))
        .collect::<Result<_>>()?;
    Ok(Page::new(page, count, results))
}

pub fn author_view(
    conn: &mut database::Connection,
    requester: &Requester,
    author: User,
    recipes_limit: i64,
) -> Result<AuthorView> {
    use database::schema::recipes::dsl::*;

    let recipes_count: i64 = recipes
        .filter(author_id.eq(author.id))
        .count()
        .get_result(conn)?;
    let preview = recipes
        .filter(author_id.eq(author.id))
        .select(RecipeHandle::as_select())
        .order((created.desc(), id.desc()))
        .limit(recipes_limit)
        .load(conn)?;

    Ok(AuthorView {
        user: view(conn, requester, author)?,
        recipes: preview,
        recipes_count,
    })
}

/// The authors `requester` follows, one page at a time.
pub fn subscriptions(
    conn: &mut database::Connection,
    requester: &Requester,
    page: PageRequest,
    recipes_limit: i64,
) -> Result<Page<AuthorView>> {
    use database::schema::subscriptions;
    use database::schema::users;

    let me = requester.user()?.id;
    if recipes_limit < 0 {
        return Err(Error::validation("recipes_limit must not be negative"));
    }

    let followed = || {
        subscriptions::table
            .filter(subscriptions::user_id.eq(me))
            .select(subscriptions::author_id)
    };
    let count: i64 = users::table
        .filter(users::id.eq_any(followed()))
        .count()
        .get_result(conn)?;
    let authors = users::table
        .filter(users::id.eq_any(followed()))
        .select(User::as_select())
        .order(users::id.asc())
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    let results = authors
        .into_iter()
        .map(|a| author_view(conn, requester, a, recipes_limit))
        .collect::<Result<_>>()?;
    Ok(Page::new(page, count, results))
}

/// Exchanges a username and password for the user's token, creating it on first login.
pub fn login(conn: &mut database::Connection, username: &str, password: &str) -> Result<String> {
    use database::schema::auth_tokens;
    use database::schema::users;
    use diesel::insert_into;

    let invalid = || Error::validation("unable to log in with provided credentials");

    let user = users::table
        .filter(users::username.eq(username))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(invalid)?;
    if !auth::verify_password(password, &user.password_hash) {
        return Err(invalid());
    }

    let existing = auth_tokens::table
        .filter(auth_tokens::user_id.eq(user.id))
        .select(auth_tokens::key)
        .first::<String>(conn)
        .optional()?;
    if let Some(key) = existing {
        return Ok(key);
    }

    let token = AuthToken {
        key: auth::generate_token(),
        user_id: user.id,
        created: chrono::Utc::now().naive_utc(),
    };
    insert_into(auth_tokens::table)
        .values(&token)
        .execute(conn)?;
    Ok(token.key)
}

pub fn logout(conn: &mut database::Connection, requester: &Requester) -> Result<()> {
    use database::schema::auth_tokens::dsl::*;
    use diesel::delete;

    let me = requester.user()?.id;
    delete(auth_tokens.filter(user_id.eq(me))).execute(conn)?;
    Ok(())
}

pub fn user_for_token(conn: &mut database::Connection, token: &str) -> Result<Option<User>> {
    use database::schema::auth_tokens;
    use database::schema::users;

    Ok(auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(token))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn set_password(
    conn: &mut database::Connection,
    requester: &Requester,
    current_password: &str,
    new_password: &str,
) -> Result<()> {
    use database::schema::users::dsl::*;
    use diesel::update;

    let me = requester.user()?;
    if !auth::verify_password(current_password, &me.password_hash) {
        return Err(Error::validation("current password is incorrect"));
    }
    validate_password(new_password)?;

    update(users.find(me.id))
        .set(password_hash.eq(auth::hash_password(new_password)))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
pub fn new_user(name: &str) -> NewUser {
    NewUser {
        email: format!("{name}@example.com"),
        username: name.into(),
        first_name: "First".into(),
        last_name: "Last".into(),
        password: "password123".into(),
    }
}

#[test]
fn register_and_login() {
    let mut conn = database::establish_in_memory().unwrap();
    let user = register(&mut conn, &new_user("alice")).unwrap();
    assert_eq!(get(&mut conn, user.id).unwrap(), user);

    let token = login(&mut conn, "alice", "password123").unwrap();
    assert_eq!(login(&mut conn, "alice", "password123").unwrap(), token);
    assert_eq!(user_for_token(&mut conn, &token).unwrap(), Some(user.clone()));

    assert!(matches!(
        login(&mut conn, "alice", "wrong-password"),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        login(&mut conn, "nobody", "password123"),
        Err(Error::Validation(_))
    ));

    logout(&mut conn, &Requester::User(user)).unwrap();
    assert_eq!(user_for_token(&mut conn, &token).unwrap(), None);
}

#[test]
fn register_rejects_bad_input() {
    let mut conn = database::establish_in_memory().unwrap();
    register(&mut conn, &new_user("alice")).unwrap();

    let duplicate = register(&mut conn, &new_user("alice"));
    assert!(matches!(duplicate, Err(Error::Validation(_))));

    for bad in [
        NewUser {
            username: "me".into(),
            ..new_user("me")
        },
        NewUser {
            username: "bad name".into(),
            ..new_user("bob")
        },
        NewUser {
            email: "not-an-email".into(),
            ..new_user("carol")
        },
        NewUser {
            password: "short".into(),
            ..new_user("dave")
        },
        NewUser {
            first_name: " ".into(),
            ..new_user("erin")
        },
    ] {
        assert!(
            matches!(register(&mut conn, &bad), Err(Error::Validation(_))),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn set_password_requires_current() {
    let mut conn = database::establish_in_memory().unwrap();
    let user = register(&mut conn, &new_user("alice")).unwrap();
    let requester = Requester::User(user.clone());

    assert!(matches!(
        set_password(&mut conn, &requester, "nope", "new-password"),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        set_password(&mut conn, &Requester::Anonymous, "password123", "new-password"),
        Err(Error::AuthenticationRequired)
    ));

    set_password(&mut conn, &requester, "password123", "new-password").unwrap();
    assert!(login(&mut conn, "alice", "password123").is_err());
    login(&mut conn, "alice", "new-password").unwrap();
}

#[test]
fn list_users_paginates() {
    let mut conn = database::establish_in_memory().unwrap();
    for name in ["a1", "a2", "a3"] {
        register(&mut conn, &new_user(name)).unwrap();
    }
    let page = list(
        &mut conn,
        &Requester::Anonymous,
        PageRequest::new(Some(2), Some(2), 6).unwrap(),
    )
    .unwrap();
    assert_eq!(page.count, 3);
    assert_eq!(page.previous, Some(1));
    assert_eq!(page.next, None);
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].username, "a3");
    assert!(!page.results[0].is_subscribed);
}
