//! Locale extraction middleware
//!
//! Negotiates the response locale from the Accept-Language header and runs
//! the rest of the request inside it.

use axum::{extract::Request, http::header::ACCEPT_LANGUAGE, middleware::Next, response::Response};

use crate::utils::{extract_locale_from_header, with_locale};

pub async fn locale_middleware(req: Request, next: Next) -> Response {
    let locale = extract_locale_from_header(
        req.headers()
            .get(ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    );

    with_locale(&locale, next.run(req)).await
}
