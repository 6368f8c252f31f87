// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Raw input records.
//!
//! A line is split into field groups by [`RecordFormat::field_separator`] and
//! each group into values by [`RecordFormat::value_separator`]:
//!
//! ```text
//! 0\t17\t42\t0.5\tred,green      (edge type 0, src 17, dst 42, weight, labels)
//! ```
//!
//! Group 0 always holds the entity-type code. An empty group has zero values.
//! [`RawRecord`] only borrows the line; typing happens in the transformer.

use serde::{Deserialize, Serialize};

/// Separators used to split input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordFormat {
    /// Separates field groups.
    pub field_separator: char,
    /// Separates values inside a multi-valued group.
    pub value_separator: char,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            field_separator: '\t',
            value_separator: ',',
        }
    }
}

impl RecordFormat {
    /// `true` when the two separators differ.
    pub fn is_valid(&self) -> bool {
        self.field_separator != self.value_separator
    }

    /// Split one line (without its line terminator) into a record view.
    pub fn parse<'a>(&self, line: &'a str) -> RawRecord<'a> {
        let groups = line
            .split(self.field_separator)
            .map(|group| {
                if group.is_empty() {
                    Vec::new()
                } else {
                    group.split(self.value_separator).collect()
                }
            })
            .collect();
        RawRecord { groups }
    }
}

/// Immutable view over one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord<'a> {
    groups: Vec<Vec<&'a str>>,
}

impl<'a> RawRecord<'a> {
    /// Number of field groups, including the entity-type code.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Values of group `index`.
    pub fn group(&self, index: usize) -> Option<&[&'a str]> {
        self.groups.get(index).map(Vec::as_slice)
    }

    /// The only value of group `index`.
    ///
    /// `Err(n)` carries the number of values found when it is not exactly
    /// one (0 for a missing group).
    pub fn single(&self, index: usize) -> Result<&'a str, usize> {
        match self.group(index) {
            Some(&[value]) => Ok(value),
            Some(values) => Err(values.len()),
            None => Err(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_splits_tabs_then_commas() {
        let rec = RecordFormat::default().parse("0\t17\t42\t0.5\tred,green");
        assert_eq!(rec.group_count(), 5);
        assert_eq!(rec.single(1), Ok("17"));
        assert_eq!(rec.group(4), Some(&["red", "green"][..]));
    }

    #[test]
    fn empty_group_has_no_values() {
        let rec = RecordFormat::default().parse("1\t\t9");
        assert_eq!(rec.group(1), Some(&[][..]));
        assert_eq!(rec.single(1), Err(0));
        assert_eq!(rec.single(7), Err(0));
    }

    #[test]
    fn multi_valued_group_is_not_single() {
        let rec = RecordFormat::default().parse("0\t1,2");
        assert_eq!(rec.single(1), Err(2));
    }

    #[test]
    fn custom_separators() {
        let fmt = RecordFormat {
            field_separator: '|',
            value_separator: ';',
        };
        assert!(fmt.is_valid());
        let rec = fmt.parse("3|a;b|c");
        assert_eq!(rec.group(1), Some(&["a", "b"][..]));
        assert!(!RecordFormat {
            field_separator: ',',
            value_separator: ','
        }
        .is_valid());
    }
}
