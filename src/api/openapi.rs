use super::handlers::{admin, auth, health, me};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Registration, login, sessions, lockout, and password reset".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Authenticated account profile".to_string());

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("Administrative account management".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and dependency checks".to_string());

    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![auth_tag, me_tag, admin_tag, health_tag]);

    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    // `.routes()` only extends `paths`/`components`, so the tags set above are preserved.
    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::session::logout_all))
        .routes(routes!(auth::password_change::change_password))
        .routes(routes!(auth::reset::request_reset))
        .routes(routes!(auth::reset::confirm_reset))
        .routes(routes!(me::me))
        .routes(routes!(admin::accounts))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<')
        && let Some(end) = author.rfind('>')
        && start < end
    {
        let name = author[..start].trim();
        let email = author[start + 1..end].trim();
        return (
            (!name.is_empty()).then_some(name),
            (!email.is_empty()).then_some(email),
        );
    }
    let trimmed = author.trim();
    ((!trimmed.is_empty()).then_some(trimmed), None)
}
