pub mod transfers;

use std::str::FromStr;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{entities::Location, errors::ServiceError, services::transfers::Operator};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Identifies the acting operator.
pub const OPERATOR_HEADER: &str = "x-operator-id";
/// Location the operator is working from (`A` or `B`).
pub const LOCATION_HEADER: &str = "x-store-location";

const MAX_OPERATOR_ID_LEN: usize = 128;

/// Operator identity taken from request headers. Requests without a valid
/// identity are rejected with 401.
#[derive(Debug, Clone)]
pub struct OperatorContext(pub Operator);

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ServiceError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ServiceError::Unauthorized(format!("Missing {} header", name)))?
        .to_str()
        .map(str::trim)
        .map_err(|_| ServiceError::Unauthorized(format!("Invalid {} header", name)))
}

pub fn operator_from_parts(parts: &Parts) -> Result<Operator, ServiceError> {
    let id = header_value(parts, OPERATOR_HEADER)?;
    if id.is_empty() || id.len() > MAX_OPERATOR_ID_LEN {
        return Err(ServiceError::Unauthorized(format!(
            "Invalid {} header",
            OPERATOR_HEADER
        )));
    }

    let location = Location::from_str(header_value(parts, LOCATION_HEADER)?).map_err(|_| {
        ServiceError::Unauthorized(format!("Unknown location in {} header", LOCATION_HEADER))
    })?;

    Ok(Operator::new(id, location))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for OperatorContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        operator_from_parts(parts).map(OperatorContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn reads_operator_and_location() {
        let parts = parts(&[(OPERATOR_HEADER, "budi"), (LOCATION_HEADER, "b")]);
        let operator = operator_from_parts(&parts).unwrap();
        assert_eq!(operator, Operator::new("budi", Location::B));
    }

    #[test]
    fn missing_or_bad_headers_are_unauthorized() {
        assert_matches!(
            operator_from_parts(&parts(&[(LOCATION_HEADER, "A")])),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            operator_from_parts(&parts(&[(OPERATOR_HEADER, "budi")])),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            operator_from_parts(&parts(&[(OPERATOR_HEADER, "budi"), (LOCATION_HEADER, "C")])),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            operator_from_parts(&parts(&[(OPERATOR_HEADER, " "), (LOCATION_HEADER, "A")])),
            Err(ServiceError::Unauthorized(_))
        );
    }
}
