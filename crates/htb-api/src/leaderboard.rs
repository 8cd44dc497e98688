use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::fields::{number, number_or_default};

/// Ranked entries as returned by a Hall of Fame endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard<T> {
    entries: Vec<T>,
}

impl<T> Leaderboard<T> {
    pub(crate) fn new(entries: Vec<T>) -> Self {
        Self { entries }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.entries
    }
}

impl<T> Deref for Leaderboard<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.entries
    }
}

impl<T> IntoIterator for Leaderboard<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Leaderboard<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A country's Hall of Fame standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    #[serde(deserialize_with = "number")]
    pub rank: u64,
    /// ISO country code
    #[serde(rename(deserialize = "country"))]
    pub country_code: String,
    pub name: String,
    #[serde(default, deserialize_with = "number")]
    pub members: u64,
    #[serde(flatten)]
    pub totals: Totals,
}

/// A university's Hall of Fame standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct University {
    #[serde(deserialize_with = "number")]
    pub rank: u64,
    pub name: String,
    #[serde(default, deserialize_with = "number")]
    pub students: u64,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Counters shared by country and university standings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default, deserialize_with = "number")]
    pub points: u64,
    #[serde(default, deserialize_with = "number_or_default")]
    pub user_owns: u64,
    #[serde(default, deserialize_with = "number_or_default")]
    pub root_owns: u64,
    #[serde(default, deserialize_with = "number_or_default")]
    pub challenge_owns: u64,
    #[serde(default, deserialize_with = "number_or_default")]
    pub user_bloods: u64,
    #[serde(default, deserialize_with = "number_or_default")]
    pub root_bloods: u64,
    /// Fortress flags
    #[serde(default, deserialize_with = "number_or_default")]
    pub fortress: u64,
    /// Endgame flags
    #[serde(default, deserialize_with = "number_or_default")]
    pub endgame: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_owns_and_root_bloods_are_kept_apart() {
        let university: University = serde_json::from_value(json!({
            "rank": 1,
            "name": "HTB University",
            "students": 50,
            "points": "1200",
            "user_owns": 300,
            "root_owns": 250,
            "challenge_owns": 80,
            "user_bloods": 4,
            "root_bloods": 2,
            "fortress": 10,
            "endgame": 3,
        }))
        .unwrap();

        assert_eq!(university.totals.root_owns, 250);
        assert_eq!(university.totals.root_bloods, 2);
        assert_eq!(university.totals.points, 1200);
    }

    #[test]
    fn country_codes() {
        let country: Country = serde_json::from_value(json!({
            "rank": 3,
            "country": "GR",
            "name": "Greece",
            "members": 900,
            "root_owns": 100,
            "root_bloods": null,
        }))
        .unwrap();

        assert_eq!(country.country_code, "GR");
        assert_eq!(country.totals.root_owns, 100);
        assert_eq!(country.totals.root_bloods, 0);
    }

    #[test]
    fn counters_sent_as_strings() {
        let country: Country = serde_json::from_value(json!({
            "rank": 1,
            "country": "US",
            "name": "United States",
            "members": 5000,
            "user_owns": "410",
            "root_bloods": "7",
            "endgame": null,
        }))
        .unwrap();

        assert_eq!(country.totals.user_owns, 410);
        assert_eq!(country.totals.root_bloods, 7);
        assert_eq!(country.totals.endgame, 0);
    }

    #[test]
    fn leaderboard_is_a_slice() {
        let board = Leaderboard::new(vec![3, 1, 2]);
        assert_eq!(board.len(), 3);
        assert_eq!(board[0], 3);
        assert_eq!((&board).into_iter().sum::<i32>(), 6);
        assert_eq!(board.into_inner(), vec![3, 1, 2]);
    }
}
