use super::*;

#[test]
fn as_str_matches_wire_codes() {
    assert_eq!(ErrorCode::NotJoined.as_str(), "NOT_JOINED");
    assert_eq!(ErrorCode::IdentityMismatch.as_str(), "IDENTITY_MISMATCH");
    assert_eq!(ErrorCode::DuplicateUser.as_str(), "DUPLICATE_USER");
    assert_eq!(ErrorCode::DuplicateObject.as_str(), "DUPLICATE_OBJECT");
    assert_eq!(ErrorCode::UnknownObject.as_str(), "UNKNOWN_OBJECT");
    assert_eq!(ErrorCode::RateLimited.as_str(), "RATE_LIMITED");
    assert_eq!(ErrorCode::Overloaded.as_str(), "OVERLOADED");
    assert_eq!(ErrorCode::GlobalSessionLimit.as_str(), "GLOBAL_SESSION_LIMIT");
    assert_eq!(ErrorCode::SessionFull.as_str(), "SESSION_FULL");
    assert_eq!(ErrorCode::Malformed.as_str(), "MALFORMED");
}

#[test]
fn display_matches_as_str() {
    assert_eq!(ErrorCode::Overloaded.to_string(), "OVERLOADED");
}

#[test]
fn http_status_reasonable() {
    assert_eq!(ErrorCode::RateLimited.http_status(), 429);
    assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
    assert_eq!(ErrorCode::Internal.http_status(), 500);
}
