//! User agent classification.
//!
//! Raw user agent strings are reduced to a coarse device class before they
//! are stored on a bundle: `desktop`, `mobile`, `bot` or `undefined`,
//! optionally suffixed with an OS family (`desktop:windows`, `mobile:ios`).
//! Strings that already carry a class are kept as-is.

use woothee::parser::Parser;

const UNDEFINED: &str = "undefined";
const CLASSES: [&str; 4] = ["desktop", "mobile", "bot", UNDEFINED];

/// Classifies user agents with woothee (~6.8us/parse).
pub struct UserAgentClassifier {
    parser: Parser,
}

impl UserAgentClassifier {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Returns the device class for a user agent string.
    pub fn classify(&self, user_agent: Option<&str>) -> String {
        let user_agent = match user_agent.map(str::trim) {
            Some(ua) if !ua.is_empty() => ua,
            _ => return UNDEFINED.to_string(),
        };

        if is_classified(user_agent) {
            return user_agent.to_string();
        }

        let Some(result) = self.parser.parse(user_agent) else {
            return UNDEFINED.to_string();
        };

        // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
        let class = match result.category {
            "pc" => "desktop",
            "smartphone" | "mobilephone" => "mobile",
            "crawler" => return "bot".to_string(),
            _ => return UNDEFINED.to_string(),
        };

        match os_family(result.os) {
            Some(os) => format!("{class}:{os}"),
            None => class.to_string(),
        }
    }
}

impl Default for UserAgentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_classified(user_agent: &str) -> bool {
    let class = user_agent.split(':').next().unwrap_or_default();
    CLASSES.contains(&class)
        && user_agent
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == ':')
}

fn os_family(os: &str) -> Option<&'static str> {
    match os {
        os if os.starts_with("Windows") => Some("windows"),
        "Mac OSX" | "Mac OS Classic" => Some("mac"),
        "iPhone" | "iPad" | "iPod" | "iOS" => Some("ios"),
        "Android" => Some("android"),
        "ChromeOS" => Some("chromeos"),
        "Linux" => Some("linux"),
        _ => None,
    }
}
