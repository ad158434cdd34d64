use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Represents ways to locate an element in the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select using an XPath expression
    XPath(String),
    /// Select using a CSS selector
    Css(String),
    /// Select by DOM id
    Id(String),
    /// Select an anchor by its exact text
    LinkText(String),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    /// The `(using, value)` pair sent to the WebDriver find endpoints.
    pub fn strategy(&self) -> Result<(&'static str, String), crate::AutomationError> {
        match self {
            Selector::XPath(x) => Ok(("xpath", x.clone())),
            Selector::Css(c) => Ok(("css selector", c.clone())),
            Selector::Id(id) => Ok(("css selector", format!("[id=\"{}\"]", escape_quotes(id)))),
            Selector::LinkText(t) => Ok(("link text", t.clone())),
            Selector::Invalid(reason) => Err(crate::AutomationError::InvalidSelector(reason.clone())),
        }
    }

    /// Canonical string form, accepted back by `Selector::from`.
    pub fn to_prefixed(&self) -> String {
        match self {
            Selector::XPath(x) => format!("xpath:{x}"),
            Selector::Css(c) => format!("css:{c}"),
            Selector::Id(id) => format!("id:{id}"),
            Selector::LinkText(t) => format!("link:{t}"),
            Selector::Invalid(reason) => format!("invalid:{reason}"),
        }
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_prefixed())
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        match s {
            "" => Selector::Invalid("Empty selector".to_string()),
            _ if s.starts_with("xpath:") => Selector::XPath(s["xpath:".len()..].to_string()),
            _ if s.starts_with("css:") => Selector::Css(s["css:".len()..].to_string()),
            _ if s.starts_with("id:") => Selector::Id(s["id:".len()..].to_string()),
            _ if s.starts_with("link:") => Selector::LinkText(s["link:".len()..].to_string()),
            // XPath expressions start at the root, a parenthesised group, or the context node
            _ if s.starts_with('/') || s.starts_with('(') || s.starts_with("./") => {
                Selector::XPath(s.to_string())
            }
            _ if s.starts_with('#') && !s[1..].contains([' ', '.', '>', '[']) => {
                Selector::Id(s[1..].to_string())
            }
            _ if s.starts_with('#') || s.starts_with('.') || s.starts_with('[') => {
                Selector::Css(s.to_string())
            }
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'xpath:', 'css:', 'id:' or 'link:' to specify the selector type."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match Selector::from(raw.as_str()) {
            Selector::Invalid(reason) => Err(serde::de::Error::custom(reason)),
            selector => Ok(selector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixes() {
        assert_eq!(
            Selector::from("xpath://button"),
            Selector::XPath("//button".into())
        );
        assert_eq!(Selector::from("css:div.kn-view"), Selector::Css("div.kn-view".into()));
        assert_eq!(Selector::from("id:submit"), Selector::Id("submit".into()));
        assert_eq!(Selector::from("link:Log out"), Selector::LinkText("Log out".into()));
    }

    #[test]
    fn bare_xpath_and_css_are_recognised() {
        assert_eq!(
            Selector::from(r#"//*[@id="view_1726_field_932_chzn"]/a"#),
            Selector::XPath(r#"//*[@id="view_1726_field_932_chzn"]/a"#.into())
        );
        assert_eq!(Selector::from("#submit"), Selector::Id("submit".into()));
        assert_eq!(
            Selector::from("#form > button"),
            Selector::Css("#form > button".into())
        );
        assert_eq!(Selector::from(".active-result"), Selector::Css(".active-result".into()));
    }

    #[test]
    fn unknown_format_is_invalid() {
        assert!(matches!(Selector::from("button"), Selector::Invalid(_)));
        assert!(Selector::from("button").strategy().is_err());
    }

    #[test]
    fn id_maps_to_css_attribute() {
        let (using, value) = Selector::Id("view_1726-field_961".into()).strategy().unwrap();
        assert_eq!(using, "css selector");
        assert_eq!(value, r#"[id="view_1726-field_961"]"#);
    }

    #[test]
    fn serde_round_trip_through_prefixed_form() {
        let sel: Selector = serde_yaml::from_str("\"//input[@type='email']\"").unwrap();
        assert_eq!(sel, Selector::XPath("//input[@type='email']".into()));
        assert!(serde_yaml::from_str::<Selector>("\"nonsense\"").is_err());
    }
}
