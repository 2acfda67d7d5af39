use crate::error::DashboardError;
use crate::password::{hash_password, verify_password};
use crate::session::{SessionContext, SessionUser};
use crate::store::{ImageDetails, ImageMatch, Role, StoredImage};
use crate::views::{self, Flash, Screen};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use suspectsight_core::{Encoding, PoolError, RecognizeError};

pub const NOT_PERMITTED: &str = "You are not permitted to do that.";
pub const EMPTY_UPLOAD: &str = "Uploaded file is empty. Please try again.";
const UNREADABLE_UPLOAD: &str = "Could not read the uploaded image. Please upload a JPEG or PNG photo.";
const MISSING_CREDENTIALS: &str = "Username and password are required.";
const INVALID_ROLE: &str = "Please choose a valid role.";

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    view: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    username: String,
    password: String,
    role: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveUser {
    username: String,
}

/// Render the screen for `user` with `flashes` above it.
async fn render(
    state: &AppState,
    user: Option<&SessionUser>,
    flashes: Vec<Flash>,
    found: Option<&ImageMatch>,
) -> Result<Html<String>, DashboardError> {
    let users;
    let screen = match user.map(|u| u.role) {
        None => Screen::Login,
        Some(Role::Admin) => Screen::Admin,
        Some(Role::Officer) => Screen::Officer { found },
        Some(Role::Administrator) => {
            users = state.store.list_users().await?;
            Screen::Administrator { users: &users }
        }
    };
    Ok(Html(views::page(user, &flashes, &screen)))
}

fn anonymous(screen: Screen<'_>, flash: Flash) -> Response {
    Html(views::page(None, &[flash], &screen)).into_response()
}

/// Hash on the blocking pool.
async fn hash_blocking(password: String) -> Result<String, DashboardError> {
    Ok(tokio::task::spawn_blocking(move || hash_password(&password)).await??)
}

/// The logged-in user, provided they have `role`.
enum Access {
    Granted(SessionUser),
    Denied(Option<SessionUser>),
}

async fn access(session: &SessionContext, role: Role) -> Result<Access, DashboardError> {
    Ok(match session.user().await? {
        Some(user) if user.role == role => Access::Granted(user),
        other => Access::Denied(other),
    })
}

async fn denied(state: &AppState, user: Option<SessionUser>) -> Result<Response, DashboardError> {
    if let Some(u) = &user {
        tracing::warn!(username = %u.username, role = %u.role, "refused action for role");
    }
    let page = render(state, user.as_ref(), vec![Flash::Error(NOT_PERMITTED.into())], None).await?;
    Ok((StatusCode::FORBIDDEN, page).into_response())
}

/// `GET /`: the current state's screen. `?view=signup` picks the signup form
/// for anonymous visitors.
pub async fn index(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Query(query): Query<IndexQuery>,
) -> Result<Response, DashboardError> {
    let user = session.user().await?;
    if user.is_none() && query.view.as_deref() == Some("signup") {
        return Ok(Html(views::page(None, &[], &Screen::Signup)).into_response());
    }
    Ok(render(&state, user.as_ref(), Vec::new(), None).await?.into_response())
}

/// `POST /signup`
pub async fn signup(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<NewUser>,
) -> Result<Response, DashboardError> {
    let username = form.username.trim().to_string();
    if username.is_empty() || form.password.is_empty() {
        return Ok(anonymous(Screen::Signup, Flash::Error(MISSING_CREDENTIALS.into())));
    }
    let Ok(role) = form.role.parse::<Role>() else {
        return Ok(anonymous(Screen::Signup, Flash::Error(INVALID_ROLE.into())));
    };

    let hash = hash_blocking(form.password).await?;
    if !state.store.insert_user(&username, &hash, role).await? {
        return Ok(anonymous(Screen::Signup, Flash::Error("Username already exists!".into())));
    }
    tracing::info!(username = %username, role = %role, "user signed up");

    let user = SessionUser { username, role };
    session.log_in(&user).await?;
    let page = render(&state, Some(&user), vec![Flash::Success("Signup successful!".into())], None).await?;
    Ok(page.into_response())
}

/// `POST /login`: unknown users and wrong passwords get the same message and
/// cost the same bcrypt check.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<Credentials>,
) -> Result<Response, DashboardError> {
    let username = form.username.trim().to_string();
    let record = state.store.find_user(&username).await?;

    let stored = record.as_ref().map(|r| r.password_hash.clone());
    let password = form.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, stored.as_deref())).await?;
    let Some(record) = record.filter(|_| verified) else {
        tracing::info!(username = %username, "failed login");
        return Ok(anonymous(Screen::Login, Flash::Error("Invalid username or password!".into())));
    };

    let user = SessionUser {
        username: record.username,
        role: record.role,
    };
    session.log_in(&user).await?;
    tracing::info!(username = %user.username, role = %user.role, "user logged in");

    let welcome = Flash::Success(format!("Welcome {}!", user.username));
    Ok(render(&state, Some(&user), vec![welcome], None).await?.into_response())
}

/// `POST /logout`
pub async fn logout(session: SessionContext) -> Result<Response, DashboardError> {
    if let Some(user) = session.user().await? {
        tracing::info!(username = %user.username, "user logged out");
    }
    session.log_out().await?;
    let page = views::page(None, &[Flash::Success("Logged out successfully!".into())], &Screen::Login);
    Ok(Html(page).into_response())
}

/// Text fields and the `image` file of a multipart form.
#[derive(Default)]
struct UploadForm {
    image: Option<Bytes>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, DashboardError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "image" {
                form.image = Some(field.bytes().await?);
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }
        Ok(form)
    }

    /// The uploaded bytes, unless the file is missing or empty.
    fn image(&self) -> Option<Bytes> {
        self.image.clone().filter(|bytes| !bytes.is_empty())
    }

    fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).map(|v| v.trim().to_string()).unwrap_or_default()
    }
}

/// Outcome of encoding an uploaded photo.
enum Probe {
    Face(Encoding),
    NoFace,
    Unreadable,
}

async fn probe(state: &AppState, bytes: &Bytes) -> Result<Probe, DashboardError> {
    match state.pool.encode_first(bytes.to_vec()).await {
        Ok(Some(encoding)) => Ok(Probe::Face(encoding)),
        Ok(None) => Ok(Probe::NoFace),
        Err(PoolError::Recognize(RecognizeError::Decode(e))) => {
            tracing::debug!(error = %e, "undecodable upload");
            Ok(Probe::Unreadable)
        }
        Err(e) => Err(e.into()),
    }
}

/// `POST /admin/upload`: host the photo, encode it and append it with its
/// details to the Admin's own document.
pub async fn admin_upload(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let user = match access(&session, Role::Admin).await? {
        Access::Granted(user) => user,
        Access::Denied(current) => return denied(&state, current).await,
    };

    let mut form = UploadForm::read(multipart).await?;
    let Some(bytes) = form.image() else {
        let page = render(&state, Some(&user), vec![Flash::Error(EMPTY_UPLOAD.into())], None).await?;
        return Ok(page.into_response());
    };

    let encoding = match probe(&state, &bytes).await? {
        Probe::Face(encoding) => Some(encoding),
        Probe::NoFace => None,
        Probe::Unreadable => {
            let page = render(&state, Some(&user), vec![Flash::Error(UNREADABLE_UPLOAD.into())], None).await?;
            return Ok(page.into_response());
        }
    };

    let image_url = state.host.upload(bytes.to_vec()).await?;
    let details = ImageDetails {
        name: form.text("name"),
        age: form.text("age"),
        place: form.text("place"),
        crime: form.text("crime"),
        phone: form.text("phone"),
    };
    let has_face = encoding.is_some();
    let image = StoredImage {
        image_url,
        details,
        encoding,
    };

    if !state.store.append_image(&user.username, image).await? {
        tracing::warn!(username = %user.username, "upload for a user that no longer exists");
        session.log_out().await?;
        return denied(&state, None).await;
    }
    tracing::info!(username = %user.username, has_face, "stored suspect photo");

    let mut flashes = vec![Flash::Success("Details submitted successfully!".into())];
    if !has_face {
        flashes.push(Flash::Warning(
            "No face was detected in this photo. It was saved but will not match any lookup.".into(),
        ));
    }
    Ok(render(&state, Some(&user), flashes, None).await?.into_response())
}

/// `POST /officer/lookup`: find the stored photo whose face matches the upload.
pub async fn officer_lookup(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    multipart: Multipart,
) -> Result<Response, DashboardError> {
    let user = match access(&session, Role::Officer).await? {
        Access::Granted(user) => user,
        Access::Denied(current) => return denied(&state, current).await,
    };

    let form = UploadForm::read(multipart).await?;
    let Some(bytes) = form.image() else {
        let page = render(&state, Some(&user), vec![Flash::Error(EMPTY_UPLOAD.into())], None).await?;
        return Ok(page.into_response());
    };

    let probe_encoding = match probe(&state, &bytes).await? {
        Probe::Face(encoding) => encoding,
        Probe::NoFace => {
            let flash = Flash::Warning("No face detected in the uploaded image.".into());
            return Ok(render(&state, Some(&user), vec![flash], None).await?.into_response());
        }
        Probe::Unreadable => {
            let flash = Flash::Error(UNREADABLE_UPLOAD.into());
            return Ok(render(&state, Some(&user), vec![flash], None).await?.into_response());
        }
    };

    let found = state.store.find_matching_image(&probe_encoding, state.matching).await?;
    tracing::info!(
        username = %user.username,
        matched = found.is_some(),
        similarity = found.as_ref().map(|m| m.similarity),
        "officer lookup"
    );

    let flash = match &found {
        Some(m) => Flash::Success(format!(
            "Match found: {}, Age: {}",
            m.image.details.name, m.image.details.age
        )),
        None => Flash::Warning("No match found.".into()),
    };
    Ok(render(&state, Some(&user), vec![flash], found.as_ref()).await?.into_response())
}

/// `POST /administrator/users`: create an Officer or Admin account.
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<NewUser>,
) -> Result<Response, DashboardError> {
    let user = match access(&session, Role::Administrator).await? {
        Access::Granted(user) => user,
        Access::Denied(current) => return denied(&state, current).await,
    };

    let username = form.username.trim().to_string();
    let role = form.role.parse::<Role>().ok().filter(|r| Role::ASSIGNABLE.contains(r));
    let flash = match role {
        _ if username.is_empty() || form.password.is_empty() => Flash::Error(MISSING_CREDENTIALS.into()),
        None => Flash::Error(INVALID_ROLE.into()),
        Some(role) => {
            let hash = hash_blocking(form.password).await?;
            if state.store.insert_user(&username, &hash, role).await? {
                tracing::info!(by = %user.username, username = %username, role = %role, "user added");
                Flash::Success("User added successfully!".into())
            } else {
                Flash::Error("Username already exists!".into())
            }
        }
    };
    Ok(render(&state, Some(&user), vec![flash], None).await?.into_response())
}

/// `POST /administrator/users/remove`: delete an account and its photos.
pub async fn remove_user(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    Form(form): Form<RemoveUser>,
) -> Result<Response, DashboardError> {
    let user = match access(&session, Role::Administrator).await? {
        Access::Granted(user) => user,
        Access::Denied(current) => return denied(&state, current).await,
    };

    let username = form.username.trim().to_string();
    let removed = state.store.remove_user(&username).await?;
    let flash = if removed {
        tracing::info!(by = %user.username, username = %username, "user removed");
        Flash::Success(format!("User {username} removed successfully!"))
    } else {
        Flash::Error("Username not found!".into())
    };

    // Removing one's own account also ends this session.
    let current = if removed && username == user.username {
        session.log_out().await?;
        None
    } else {
        Some(user)
    };
    Ok(render(&state, current.as_ref(), vec![flash], None).await?.into_response())
}
