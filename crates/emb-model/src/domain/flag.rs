use serde::{Deserialize, Serialize};

/// Boolean switch with explicit on/off constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flag(bool);

impl Flag {
    pub const fn on() -> Self {
        Self(true)
    }

    pub const fn off() -> Self {
        Self(false)
    }

    #[inline]
    pub const fn is_on(self) -> bool {
        self.0
    }
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        Self(b)
    }
}

impl From<Flag> for bool {
    fn from(f: Flag) -> Self {
        f.0
    }
}

#[cfg(test)]
mod tests {
    use super::Flag;

    #[test]
    fn default_is_off() {
        assert!(!Flag::default().is_on());
        assert!(Flag::on().is_on());
    }

    #[test]
    fn serializes_as_plain_bool() {
        assert_eq!(serde_json::to_string(&Flag::on()).unwrap(), "true");
        let back: Flag = serde_json::from_str("false").unwrap();
        assert_eq!(back, Flag::off());
    }
}
