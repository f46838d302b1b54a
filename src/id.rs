use uuid::Uuid;

const SETUP_PASSWORD_LEN: usize = 16;

/// Time-ordered identifier for new instances.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Random setup credential handed to the operator when an instance is created.
pub fn new_setup_password() -> String {
    let mut raw = Uuid::new_v4().simple().to_string();
    raw.truncate(SETUP_PASSWORD_LEN);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v7_is_parseable_and_versioned() {
        let id = new_uuid_v7();
        let parsed = Uuid::parse_str(&id).expect("valid uuid");
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn setup_passwords_are_hex_and_distinct() {
        let a = new_setup_password();
        let b = new_setup_password();
        assert_eq!(a.len(), SETUP_PASSWORD_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
