//! Flat global group addressing.
//!
//! Every multicast group on the bus is reachable through one flat number.
//! The number splits into a family index and a group index local to that
//! family:
//!
//! ```text
//!   global = family * GROUPS_PER_FAMILY + local
//!
//!   0..=99     genl_test0 / genl_mcgrp0..=genl_mcgrp99
//!   100..=199  genl_test1 / genl_mcgrp0..=genl_mcgrp99
//!   ...
//!   400..=499  genl_test4 / genl_mcgrp0..=genl_mcgrp99
//! ```
//!
//! Producer and consumer both derive names from the constants below; a
//! mismatch between the two sides makes resolution fail.

use std::fmt;
use std::str::FromStr;

use crate::netlink::{Error, Result};

/// Prefix of every family name.
pub const FAMILY_BASE_NAME: &str = "genl_test";

/// Prefix of every multicast group name.
pub const GROUP_BASE_NAME: &str = "genl_mcgrp";

/// Number of families the producer registers.
pub const FAMILY_COUNT: usize = 5;

/// Multicast groups owned by each family.
pub const GROUPS_PER_FAMILY: usize = 100;

/// Size of the flat address space.
pub const TOTAL_GROUPS: usize = FAMILY_COUNT * GROUPS_PER_FAMILY;

/// Canonical name of family `family_index`.
pub fn family_name(family_index: usize) -> String {
    format!("{FAMILY_BASE_NAME}{family_index}")
}

/// Canonical name of local group `local_group`.
pub fn group_name(local_group: usize) -> String {
    format!("{GROUP_BASE_NAME}{local_group}")
}

/// Split a flat group number into its family and local group.
pub fn decompose(id: usize) -> Result<GroupAddress> {
    if id >= TOTAL_GROUPS {
        return Err(Error::OutOfRange {
            what: "group",
            value: id,
            max: TOTAL_GROUPS - 1,
        });
    }
    Ok(GroupAddress {
        family: id / GROUPS_PER_FAMILY,
        group: id % GROUPS_PER_FAMILY,
    })
}

/// Inverse of [`decompose`].
pub fn compose(family: usize, group: usize) -> Result<GlobalGroupId> {
    Ok(GroupAddress::new(family, group)?.global())
}

/// A (family index, local group index) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupAddress {
    /// Family index, `0..FAMILY_COUNT`.
    pub family: usize,
    /// Group index inside the family, `0..GROUPS_PER_FAMILY`.
    pub group: usize,
}

impl GroupAddress {
    /// Build an address, checking both indices.
    pub fn new(family: usize, group: usize) -> Result<Self> {
        if family >= FAMILY_COUNT {
            return Err(Error::OutOfRange {
                what: "family",
                value: family,
                max: FAMILY_COUNT - 1,
            });
        }
        if group >= GROUPS_PER_FAMILY {
            return Err(Error::OutOfRange {
                what: "local group",
                value: group,
                max: GROUPS_PER_FAMILY - 1,
            });
        }
        Ok(Self { family, group })
    }

    /// The flat number for this address.
    pub fn global(self) -> GlobalGroupId {
        GlobalGroupId(self.family * GROUPS_PER_FAMILY + self.group)
    }

    /// Name of the owning family.
    pub fn family_name(&self) -> String {
        family_name(self.family)
    }

    /// Name of the group inside its family.
    pub fn group_name(&self) -> String {
        group_name(self.group)
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.family_name(), self.group_name())
    }
}

/// A validated flat group number, `0..TOTAL_GROUPS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalGroupId(usize);

impl GlobalGroupId {
    /// Validate a flat group number.
    pub fn new(id: usize) -> Result<Self> {
        decompose(id).map(GroupAddress::global)
    }

    /// The raw number.
    pub fn get(self) -> usize {
        self.0
    }

    /// Family and local group this number refers to.
    pub fn address(self) -> GroupAddress {
        GroupAddress {
            family: self.0 / GROUPS_PER_FAMILY,
            group: self.0 % GROUPS_PER_FAMILY,
        }
    }
}

impl fmt::Display for GlobalGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl GlobalGroupId {
    /// Parse a comma separated list such as `"0,150,499"`.
    ///
    /// Empty segments (`"1,,2"`, a trailing comma) are skipped.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .filter(|token| !token.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for GlobalGroupId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: usize = s
            .trim()
            .parse()
            .map_err(|_| Error::Usage(format!("invalid group number '{s}'")))?;
        Self::new(id).map_err(|_| {
            Error::Usage(format!(
                "Invalid group number {id}. Values allowed 0:{}",
                TOTAL_GROUPS - 1
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[GlobalGroupId]) -> Vec<usize> {
        list.iter().map(|g| g.get()).collect()
    }

    #[test]
    fn test_parse_list_skips_empty_segments() {
        assert_eq!(ids(&GlobalGroupId::parse_list("1,,2").unwrap()), vec![1, 2]);
        assert_eq!(ids(&GlobalGroupId::parse_list("1,").unwrap()), vec![1]);
        assert_eq!(ids(&GlobalGroupId::parse_list(", 7 ,").unwrap()), vec![7]);
        assert!(GlobalGroupId::parse_list(",").unwrap().is_empty());

        let err = GlobalGroupId::parse_list("1,,500").unwrap_err();
        assert!(err.is_usage());
        assert!(GlobalGroupId::parse_list("1,x").is_err());
    }

    #[test]
    fn test_decompose_whole_range() {
        for id in 0..TOTAL_GROUPS {
            let addr = decompose(id).unwrap();
            assert_eq!(addr.family, id / 100);
            assert_eq!(addr.group, id % 100);
            assert_eq!(compose(addr.family, addr.group).unwrap().get(), id);
        }
    }

    #[test]
    fn test_decompose_out_of_range() {
        for id in [500, 501, 999, usize::MAX] {
            assert!(matches!(
                decompose(id),
                Err(Error::OutOfRange { what: "group", .. })
            ));
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(family_name(3), "genl_test3");
        assert_eq!(group_name(7), "genl_mcgrp7");
        assert_eq!(family_name(0), "genl_test0");
        assert_eq!(group_name(99), "genl_mcgrp99");
    }

    #[test]
    fn test_address_names() {
        let addr = GlobalGroupId::new(150).unwrap().address();
        assert_eq!(addr, GroupAddress { family: 1, group: 50 });
        assert_eq!(addr.to_string(), "genl_test1/genl_mcgrp50");
    }

    #[test]
    fn test_compose_checks_both_indices() {
        assert!(compose(5, 0).is_err());
        assert!(compose(0, 100).is_err());
        assert_eq!(compose(4, 99).unwrap().get(), 499);
    }

    #[test]
    fn test_parse() {
        assert_eq!("42".parse::<GlobalGroupId>().unwrap().get(), 42);
        assert_eq!(" 7 ".parse::<GlobalGroupId>().unwrap().get(), 7);

        let err = "500".parse::<GlobalGroupId>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid group number 500. Values allowed 0:499");

        assert!("abc".parse::<GlobalGroupId>().unwrap_err().is_usage());
        assert!("-1".parse::<GlobalGroupId>().is_err());
    }
}
