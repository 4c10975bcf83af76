use super::handlers::{access, auth, health, login, users};
use axum::middleware;
use utoipa::openapi::{
    security::{Http, HttpAuthScheme, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

pub const SECURITY_SCHEME: &str = "api_token";

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Every `/v1` route sits behind the bearer token guard; `/health` does not.
pub(crate) fn api_router() -> OpenApiRouter {
    let latch = OpenApiRouter::new()
        .routes(routes!(access::set_access))
        .routes(routes!(users::lookup, users::enroll, users::unenroll))
        .routes(routes!(users::forget))
        .routes(routes!(login::login))
        .route_layer(middleware::from_fn(auth::require_api_token));

    let mut latch_tag = Tag::new("latch");
    latch_tag.description = Some("Latch access, user pairing and login challenge".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and storage health".to_string());

    // utoipa-axum 0.1 has no `get_openapi_mut`; set tags and the security
    // scheme on the base document, which `merge` preserves.
    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![latch_tag, health_tag]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            SECURITY_SCHEME,
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .merge(latch)
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
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
    // Cargo authors may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(':').next().map(str::trim)?;
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

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let Some(start) = author.find('<') else {
        let name = author.trim();
        return ((!name.is_empty()).then_some(name), None);
    };

    let name = author[..start].trim();
    let email = author[start + 1..].trim_end_matches('>').trim();
    (
        (!name.is_empty()).then_some(name),
        (!email.is_empty()).then_some(email),
    )
}
