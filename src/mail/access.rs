// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Capabilities checked before a mailbox is mutated.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Confirmations an irreversible operation needs.
pub const REQUIRED_CONFIRMATIONS: u8 = 3;

/// An identity that can own a mailbox or act on one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub u64);

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "#{}", self.0);
    }
}

/// The rights a caller brings to a mailbox operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Access {
    principal: Principal,
    wizard: bool,
}

impl Access {
    /// Rights of an ordinary principal: its own mailbox only.
    pub fn new(principal: Principal) -> Access {
        return Access {
            principal,
            wizard: false,
        };
    }

    /// Rights over every mailbox.
    pub fn wizard(principal: Principal) -> Access {
        return Access {
            principal,
            wizard: true,
        };
    }

    pub fn principal(&self) -> Principal {
        return self.principal;
    }

    /// Fail unless this caller may mutate a mailbox owned by `owner`.
    pub fn check(&self, owner: Principal) -> Result<()> {
        if self.wizard || self.principal == owner {
            return Ok(());
        }
        return Err(Error::PermissionDenied {
            principal: self.principal.0,
        });
    }
}

/// Operator confirmations collected for an irreversible operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Consent {
    given: u8,
}

impl Consent {
    pub fn none() -> Consent {
        return Consent::default();
    }

    /// Consent with all required confirmations.
    pub fn confirmed() -> Consent {
        return Consent {
            given: REQUIRED_CONFIRMATIONS,
        };
    }

    /// Add one confirmation.
    pub fn confirm(self) -> Consent {
        return Consent {
            given: self.given.saturating_add(1),
        };
    }

    pub fn given(&self) -> u8 {
        return self.given;
    }

    pub(crate) fn require(&self, needed: u8) -> Result<()> {
        if self.given < needed {
            return Err(Error::ConsentRequired {
                needed,
                given: self.given,
            });
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_and_wizards_pass() {
        let owner = Principal(7);
        assert!(Access::new(owner).check(owner).is_ok());
        assert!(Access::wizard(Principal(2)).check(owner).is_ok());
        assert!(matches!(
            Access::new(Principal(8)).check(owner),
            Err(Error::PermissionDenied { principal: 8 })
        ));
    }

    #[test]
    fn consent_needs_three_confirmations() {
        let twice = Consent::none().confirm().confirm();
        assert!(matches!(
            twice.require(REQUIRED_CONFIRMATIONS),
            Err(Error::ConsentRequired { needed: 3, given: 2 })
        ));
        assert!(twice.confirm().require(REQUIRED_CONFIRMATIONS).is_ok());
        assert_eq!(Consent::confirmed().given(), 3);
    }
}
