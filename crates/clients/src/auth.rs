//! Caller identity carried as request metadata.

use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::Request;

pub const GROUP_ID_KEY: &str = "x-awakari-group-id";
pub const USER_ID_KEY: &str = "x-awakari-user-id";

/// Wrap `message` in a request carrying the group and user ids.
pub fn authenticated<T>(message: T, group_id: &str, user_id: &str) -> Result<Request<T>, String> {
    let mut request = Request::new(message);
    set_identity(request.metadata_mut(), group_id, user_id)?;
    Ok(request)
}

fn set_identity(md: &mut MetadataMap, group_id: &str, user_id: &str) -> Result<(), String> {
    let group: AsciiMetadataValue = group_id
        .parse()
        .map_err(|_| format!("group id is not valid metadata: {group_id:?}"))?;
    md.insert(GROUP_ID_KEY, group);
    if !user_id.is_empty() {
        let user: AsciiMetadataValue = user_id
            .parse()
            .map_err(|_| format!("user id is not valid metadata: {user_id:?}"))?;
        md.insert(USER_ID_KEY, user);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_headers() {
        let req = authenticated((), "default", "user-1").unwrap();
        let md = req.metadata();
        assert_eq!(md.get(GROUP_ID_KEY).unwrap().to_str().unwrap(), "default");
        assert_eq!(md.get(USER_ID_KEY).unwrap().to_str().unwrap(), "user-1");
    }

    #[test]
    fn test_empty_user_is_omitted() {
        let req = authenticated((), "default", "").unwrap();
        assert!(req.metadata().get(USER_ID_KEY).is_none());
    }

    #[test]
    fn test_non_ascii_identity_is_rejected() {
        assert!(authenticated((), "grp\n", "u").is_err());
    }
}
