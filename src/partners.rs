//! Static partner directory — maps trusted sender addresses to WMS identities.
//!
//! Partners are immutable configuration: a sender address, the WMS depositor
//! ids it may submit for, the lowercase name tokens used to recognize the
//! depositor inside a data file, and the addresses that receive order-error
//! notifications.

/// Configuration for one trusted partner sender.
#[derive(Debug, Clone)]
pub struct PartnerProfile {
    /// Address the partner's ERP uses for automated mail.
    pub sender_address: String,
    /// WMS depositor ids, index-aligned with `name_tokens`.
    pub partner_ids: Vec<String>,
    /// Lowercase tokens that identify a depositor in file content.
    pub name_tokens: Vec<String>,
    /// Addresses notified when order creation fails permanently.
    pub notify_addresses: Vec<String>,
}

impl PartnerProfile {
    /// Derive the depositor WMS id from decoded data-file content.
    ///
    /// The depositor name lives on the second text line; the first
    /// configured token found as a substring wins.
    pub fn match_content(&self, text: &str) -> Option<&str> {
        let line = text.lines().nth(1)?.to_lowercase();
        self.name_tokens
            .iter()
            .position(|token| line.contains(token.as_str()))
            .and_then(|i| self.partner_ids.get(i))
            .map(String::as_str)
    }
}

/// Immutable lookup table over all configured partners.
pub struct PartnerDirectory {
    profiles: Vec<PartnerProfile>,
}

impl PartnerDirectory {
    /// The production partner set.
    pub fn builtin() -> Self {
        Self::from_profiles(vec![
            PartnerProfile {
                sender_address: "reporting_1c@elica.com".to_string(),
                partner_ids: vec!["7e40e90a-184b-11ef-aaf3-f4034359b8bd".to_string()],
                name_tokens: vec!["элика".to_string()],
                notify_addresses: vec![
                    "v.toropchina@elica.com".to_string(),
                    "o.sorokina@elica.com".to_string(),
                ],
            },
            PartnerProfile {
                sender_address: "noreply@jackys.com.ru".to_string(),
                partner_ids: vec!["4dc2c3f2-734b-11ea-aecb-68b599cc4ea2".to_string()],
                name_tokens: vec!["смарт".to_string()],
                notify_addresses: vec![
                    "ga@jackys.com.ru".to_string(),
                    "akinenkova@smarttechnika.ru".to_string(),
                    "alexey.yurchenko@jackys.com.ru".to_string(),
                ],
            },
            PartnerProfile {
                sender_address: "noreply@smarttechnika.ru".to_string(),
                partner_ids: vec!["f1b494b5-2416-11eb-8bb0-68b599cc4ea2".to_string()],
                name_tokens: vec!["бизнес".to_string()],
                notify_addresses: vec![
                    "ga@jackys.com.ru".to_string(),
                    "akinenkova@smarttechnika.ru".to_string(),
                    "alexey.yurchenko@jackys.com.ru".to_string(),
                ],
            },
        ])
    }

    pub fn from_profiles(profiles: Vec<PartnerProfile>) -> Self {
        Self { profiles }
    }

    /// Resolve a sender address to its partner profile.
    pub fn resolve(&self, sender: &str) -> Option<&PartnerProfile> {
        self.profiles
            .iter()
            .find(|p| p.sender_address.eq_ignore_ascii_case(sender))
    }

    /// All profiles that carry the given WMS depositor id.
    pub fn profiles_with_wms_id<'a>(
        &'a self,
        wms_id: &'a str,
    ) -> impl Iterator<Item = &'a PartnerProfile> {
        self.profiles
            .iter()
            .filter(move |p| p.partner_ids.iter().any(|id| id == wms_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_profile() -> PartnerProfile {
        PartnerProfile {
            sender_address: "erp@partner.test".to_string(),
            partner_ids: vec!["wms-1".to_string(), "wms-2".to_string()],
            name_tokens: vec!["альфа".to_string(), "бета".to_string()],
            notify_addresses: vec!["ops@partner.test".to_string()],
        }
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let dir = PartnerDirectory::from_profiles(vec![test_profile()]);
        assert!(dir.resolve("ERP@Partner.Test").is_some());
        assert!(dir.resolve("other@partner.test").is_none());
    }

    #[test]
    fn match_content_reads_second_line() {
        let profile = test_profile();
        assert_eq!(
            profile.match_content("header\nООО Бета Трейд\nrest"),
            Some("wms-2")
        );
    }

    #[test]
    fn match_content_first_token_wins() {
        let profile = test_profile();
        assert_eq!(
            profile.match_content("header\nальфа и бета\nrest"),
            Some("wms-1")
        );
    }

    #[test]
    fn match_content_without_second_line() {
        let profile = test_profile();
        assert_eq!(profile.match_content("only one line"), None);
    }

    #[test]
    fn profiles_with_wms_id_filters() {
        let dir = PartnerDirectory::from_profiles(vec![test_profile()]);
        assert_eq!(dir.profiles_with_wms_id("wms-2").count(), 1);
        assert_eq!(dir.profiles_with_wms_id("wms-9").count(), 0);
    }

    #[test]
    fn builtin_directory_resolves_known_senders() {
        let dir = PartnerDirectory::builtin();
        let profile = dir.resolve("reporting_1c@elica.com").expect("known sender");
        assert_eq!(profile.partner_ids.len(), profile.name_tokens.len());
        assert!(!profile.notify_addresses.is_empty());
    }
}
