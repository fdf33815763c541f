// This file is part of the terraform-provider-cloud project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::BTreeSet;

use crypto::{digest::Digest, sha1::Sha1};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tf_provider::value::{Value, ValueNumber, ValueString};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Generate a default name such as `tf-vpc-3k9x0a1bq2`
pub(crate) fn unique_name(prefix: &str) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("tf-{prefix}-{suffix}")
}

/// Format a unix timestamp from the API as RFC 3339
pub(crate) fn format_timestamp(timestamp: i64) -> String {
    if timestamp <= 0 {
        return String::new();
    }
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

/// Stable identifier for a data source result
pub(crate) fn hash_ids<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut digest = Sha1::new();
    let mut sep = "";
    for id in ids {
        digest.input_str(sep);
        digest.input_str(id.as_ref());
        sep = ",";
    }
    digest.result_str()
}

/// Owned string value from API output
pub(crate) fn value_string<'a>(s: impl Into<String>) -> ValueString<'a> {
    Value::Value(Cow::Owned(s.into()))
}

/// Like [`value_string`], but an empty string becomes null
pub(crate) fn value_string_opt<'a>(s: impl Into<String>) -> ValueString<'a> {
    let s = s.into();
    if s.is_empty() {
        Value::Null
    } else {
        Value::Value(Cow::Owned(s))
    }
}

/// String of a known value, or `default` when null or unknown
pub(crate) fn str_or<'v>(value: &'v ValueString<'_>, default: &'v str) -> &'v str {
    value.as_deref_option().unwrap_or(default)
}

/// Known number, or `default` when null or unknown
pub(crate) fn number_or(value: &ValueNumber, default: i64) -> i64 {
    value.as_ref_option().copied().unwrap_or(default)
}

/// Set of strings from API output
pub(crate) fn value_set<'a, I>(items: I) -> Value<BTreeSet<ValueString<'a>>>
where
    I: IntoIterator<Item = String>,
{
    Value::Value(items.into_iter().map(value_string).collect())
}

/// List of strings from API output
pub(crate) fn value_list<'a, I>(items: I) -> Value<Vec<ValueString<'a>>>
where
    I: IntoIterator<Item = String>,
{
    Value::Value(items.into_iter().map(value_string).collect())
}

/// Known strings of a collection value, in iteration order
pub(crate) fn known_strings<'v, 'a: 'v, C>(collection: &'v Value<C>) -> Vec<String>
where
    &'v C: IntoIterator<Item = &'v ValueString<'a>>,
{
    collection
        .as_ref_option()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_deref_option().map(str::to_owned))
        .collect()
}

pub struct DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    iter: RefCell<T>,
    sep: &'a str,
}

pub trait DisplayJoinable {
    type Joiner<'a>;
    fn join_with(self, sep: &str) -> Self::Joiner<'_>;
}

impl<T, I> DisplayJoinable for T
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    type Joiner<'a> = DisplayJoiner<'a, T, I>;

    fn join_with(self, sep: &str) -> Self::Joiner<'_> {
        DisplayJoiner {
            iter: RefCell::new(self),
            sep,
        }
    }
}

impl<'a, T, I> std::fmt::Display for DisplayJoiner<'a, T, I>
where
    T: Iterator<Item = I>,
    I: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sep = "";
        let mut iter = self.iter.try_borrow_mut().or(Err(std::fmt::Error))?;
        for elt in iter.by_ref() {
            f.write_str(sep)?;
            f.write_fmt(format_args!("{elt}"))?;
            sep = self.sep;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_states() {
        assert_eq!(["Running", "Stopped"].iter().join_with(", ").to_string(), "Running, Stopped");
        assert_eq!(std::iter::empty::<&str>().join_with(", ").to_string(), "");
    }

    #[test]
    fn unique_names() {
        let name = unique_name("vpc");
        assert!(name.starts_with("tf-vpc-"));
        assert_eq!(name.len(), "tf-vpc-".len() + 10);
        assert_ne!(name, unique_name("vpc"));
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14T22:13:20Z");
        assert_eq!(format_timestamp(0), "");
    }

    #[test]
    fn ids_hash() {
        assert_eq!(
            hash_ids(["ins-1", "ins-2"]),
            "038b3d08c75b005a4617f5d3fed65fef2b0aeac3"
        );
    }

    #[test]
    fn collections() {
        let set = value_set(["b".to_owned(), "a".to_owned(), "a".to_owned()]);
        assert_eq!(known_strings(&set), vec!["a", "b"]);

        let mut list = value_list(["z".to_owned(), "y".to_owned()]);
        if let Value::Value(items) = &mut list {
            items.push(Value::Unknown);
        }
        assert_eq!(known_strings(&list), vec!["z", "y"]);
        let empty: Value<Vec<ValueString>> = Value::Null;
        assert!(known_strings(&empty).is_empty());
    }

    #[test]
    fn optional_strings() {
        assert_eq!(value_string_opt(""), Value::Null);
        assert_eq!(value_string_opt("a"), Value::Value(Cow::Borrowed("a")));
        assert_eq!(str_or(&Value::Null, "Default"), "Default");
        assert_eq!(str_or(&value_string("x"), "Default"), "x");
        assert_eq!(number_or(&Value::Unknown, 3), 3);
        assert_eq!(number_or(&Value::Value(5), 3), 5);
    }
}
