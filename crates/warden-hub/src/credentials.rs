//! Fallback credential checks: admin password, PIN, and RFID cards.
//!
//! Secrets come from configuration; nothing is compiled in.

use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

/// Session user name for a successful PIN login.
pub const PIN_USER: &str = "Fallback User";

#[derive(Debug, Clone)]
pub struct Credentials {
    admin_password: String,
    pin: String,
    rfid_cards: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(admin_password: String, pin: String, rfid_cards: BTreeMap<String, String>) -> Self {
        Self {
            admin_password,
            pin,
            rfid_cards,
        }
    }

    pub fn verify_admin(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.admin_password.as_bytes()))
    }

    pub fn verify_pin(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.pin.as_bytes()))
    }

    /// Identity bound to an RFID card, if the card is registered.
    pub fn rfid_user(&self, card_id: &str) -> Option<&str> {
        self.rfid_cards.get(card_id).map(String::as_str)
    }

    pub fn rfid_cards(&self) -> impl Iterator<Item = &str> {
        self.rfid_cards.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        let mut cards = BTreeMap::new();
        cards.insert("card1".to_string(), "Admin".to_string());
        cards.insert("card2".to_string(), "Guest".to_string());
        Credentials::new("s3cret".into(), "482913".into(), cards)
    }

    #[test]
    fn test_pin() {
        let c = creds();
        assert!(c.verify_pin("482913"));
        assert!(!c.verify_pin("482914"));
        assert!(!c.verify_pin("48291"));
        assert!(!c.verify_pin(""));
    }

    #[test]
    fn test_admin() {
        let c = creds();
        assert!(c.verify_admin("s3cret"));
        assert!(!c.verify_admin("s3cret "));
    }

    #[test]
    fn test_rfid_lookup() {
        let c = creds();
        assert_eq!(c.rfid_user("card2"), Some("Guest"));
        assert_eq!(c.rfid_user("card9"), None);
        assert_eq!(c.rfid_cards().collect::<Vec<_>>(), vec!["card1", "card2"]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let c = Credentials::new("pw".into(), "123456".into(), BTreeMap::new());
        assert!(!c.verify_admin(""));
        assert!(!c.verify_admin("pwx"));
        assert!(!c.verify_pin("1234567"));
    }
}
