//! Tag classification and age-rating mapping
//!
//! Providers report free-form tags. Before chapter metadata is written they are
//! run through the user's preferences: renamed via tag mappings, split into
//! genres and tags, filtered by the blacklist and whitelist, and mapped to the
//! strictest matching ComicInfo age rating.
//!
//! Tags are always compared after [`normalize`], so `"Slice of Life"` and
//! `"slice-of-life"` are the same tag.

use serde::{Deserialize, Serialize};

/// Lowercase `value` and drop every non-alphanumeric character
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A tag as reported by a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Display value
    pub value: String,
    /// Provider identifier, falls back to the value when empty
    #[serde(default)]
    pub id: String,
    /// Whether the provider scoped this tag, and if so whether as a genre
    #[serde(default)]
    pub genre: Option<bool>,
}

impl Tag {
    /// Plain tag without identifier or scope
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            id: String::new(),
            genre: None,
        }
    }

    /// Tag the provider explicitly scoped as genre (`true`) or tag (`false`)
    pub fn scoped(value: impl Into<String>, id: impl Into<String>, genre: bool) -> Self {
        Self {
            value: value.into(),
            id: id.into(),
            genre: Some(genre),
        }
    }

    /// Identifier, or the value when the provider gave none
    pub fn identifier(&self) -> &str {
        if self.id.is_empty() {
            &self.value
        } else {
            &self.id
        }
    }

    fn forced_genre(&self) -> bool {
        self.genre.unwrap_or(false)
    }
}

/// Renames `origin_tag` to `destination_tag`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMapping {
    /// Tag to replace, compared normalized
    pub origin_tag: String,
    /// Replacement value, used as-is
    pub destination_tag: String,
}

/// Assigns an age rating to every chapter carrying `tag`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRatingMapping {
    /// Tag that triggers the rating, compared normalized
    pub tag: String,
    /// Rating to apply
    pub age_rating: AgeRating,
}

/// ComicInfo age ratings, ordered from least to most restrictive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeRating {
    /// No rating known
    Unknown,
    /// Rating pending
    #[serde(rename = "Rating Pending")]
    RatingPending,
    /// Early childhood
    #[serde(rename = "Early Childhood")]
    EarlyChildhood,
    /// Everyone
    Everyone,
    /// General audiences
    G,
    /// Everyone 10 and older
    #[serde(rename = "Everyone 10+")]
    Everyone10,
    /// Parental guidance
    #[serde(rename = "PG")]
    Pg,
    /// Kids to adults
    #[serde(rename = "Kids to Adults")]
    KidsToAdults,
    /// Teen
    Teen,
    /// Mature, 15 and older
    #[serde(rename = "MA15+")]
    MatureA15,
    /// Mature, 17 and older
    #[serde(rename = "Mature 17+")]
    Mature17,
    /// Mature
    M,
    /// Restricted, 18 and older
    #[serde(rename = "R18+")]
    R18,
    /// Adults only
    #[serde(rename = "Adults Only 18+")]
    AdultsOnly18,
    /// Explicit
    #[serde(rename = "X18+")]
    X18,
}

impl AgeRating {
    /// The value written to ComicInfo.xml
    pub fn as_str(self) -> &'static str {
        match self {
            AgeRating::Unknown => "Unknown",
            AgeRating::RatingPending => "Rating Pending",
            AgeRating::EarlyChildhood => "Early Childhood",
            AgeRating::Everyone => "Everyone",
            AgeRating::G => "G",
            AgeRating::Everyone10 => "Everyone 10+",
            AgeRating::Pg => "PG",
            AgeRating::KidsToAdults => "Kids to Adults",
            AgeRating::Teen => "Teen",
            AgeRating::MatureA15 => "MA15+",
            AgeRating::Mature17 => "Mature 17+",
            AgeRating::M => "M",
            AgeRating::R18 => "R18+",
            AgeRating::AdultsOnly18 => "Adults Only 18+",
            AgeRating::X18 => "X18+",
        }
    }
}

impl std::fmt::Display for AgeRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's tag preferences
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPreferences {
    /// Tags that are genres
    #[serde(default)]
    pub genres: Vec<String>,
    /// Tags that are never written
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Tags that are written even without `include_unmatched`
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Renames applied before anything else
    #[serde(default)]
    pub tag_mappings: Vec<TagMapping>,
    /// Tag to age rating table
    #[serde(default)]
    pub age_rating_mappings: Vec<AgeRatingMapping>,
}

/// Result of [`TagMapper::classify`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    /// Values classified as genres, in input order
    pub genres: Vec<String>,
    /// Values classified as tags, in input order
    pub tags: Vec<String>,
}

impl Classification {
    /// Comma-separated genres, the ComicInfo `<Genre>` format
    pub fn genre_list(&self) -> String {
        self.genres.join(", ")
    }

    /// Comma-separated tags, the ComicInfo `<Tags>` format
    pub fn tag_list(&self) -> String {
        self.tags.join(", ")
    }
}

fn map_value(mappings: &[TagMapping], value: &str) -> String {
    let normalized = normalize(value);
    mappings
        .iter()
        .find(|m| normalize(&m.origin_tag) == normalized)
        .map(|m| m.destination_tag.clone())
        .unwrap_or_else(|| value.to_string())
}

/// Apply tag mappings to the value and identifier of every tag
///
/// The provider's genre scope is kept as-is.
pub fn map_tags(mappings: &[TagMapping], tags: &[Tag]) -> Vec<Tag> {
    tags.iter()
        .map(|tag| Tag {
            value: map_value(mappings, &tag.value),
            id: map_value(mappings, tag.identifier()),
            genre: tag.genre,
        })
        .collect()
}

/// Classifies provider tags with a user's preferences
///
/// Preferences are optional: when they failed to load nothing is classified
/// and no age rating is found.
#[derive(Clone, Debug, Default)]
pub struct TagMapper {
    preferences: Option<TagPreferences>,
    include_unmatched: bool,
    skip_on_failure: bool,
}

impl TagMapper {
    /// Build a mapper
    pub fn new(
        preferences: Option<TagPreferences>,
        include_unmatched: bool,
        skip_on_failure: bool,
    ) -> Self {
        Self {
            preferences,
            include_unmatched,
            skip_on_failure,
        }
    }

    /// The preferences, if they loaded
    pub fn preferences(&self) -> Option<&TagPreferences> {
        self.preferences.as_ref()
    }

    /// Split tags into genres and tags
    ///
    /// A tag is a genre when it is not blacklisted and is either a configured
    /// genre or scoped as one by the provider. It is a tag when it is not
    /// blacklisted, not a genre, and either whitelisted or `include_unmatched`
    /// is set. Value and identifier are both checked against each list.
    pub fn classify(&self, tags: &[Tag]) -> Classification {
        let Some(prefs) = &self.preferences else {
            if self.skip_on_failure {
                tracing::debug!("tag preferences unavailable, skipping tags");
            } else {
                tracing::warn!("no genres or tags will be set, preferences couldn't be loaded");
            }
            return Classification::default();
        };

        let genres = normalized(&prefs.genres);
        let blacklist = normalized(&prefs.blacklist);
        let whitelist = normalized(&prefs.whitelist);

        let contains = |list: &[String], tag: &Tag| {
            list.contains(&normalize(&tag.value)) || list.contains(&normalize(tag.identifier()))
        };

        let mut out = Classification::default();
        for tag in map_tags(&prefs.tag_mappings, tags) {
            if contains(&blacklist, &tag) {
                continue;
            }

            let is_genre = contains(&genres, &tag) || tag.forced_genre();
            if is_genre {
                out.genres.push(tag.value);
            } else if self.include_unmatched || contains(&whitelist, &tag) {
                out.tags.push(tag.value);
            }
        }
        out
    }

    /// Strictest age rating any of `tags` maps to, after tag mappings
    ///
    /// Callers pass series and chapter tags together.
    pub fn highest_age_rating(&self, tags: &[Tag]) -> Option<AgeRating> {
        let Some(prefs) = &self.preferences else {
            tracing::warn!("could not load age rating mappings, not setting age rating");
            return None;
        };

        map_tags(&prefs.tag_mappings, tags)
            .iter()
            .filter_map(|tag| {
                let value = normalize(&tag.value);
                prefs
                    .age_rating_mappings
                    .iter()
                    .filter(|m| normalize(&m.tag) == value)
                    .map(|m| m.age_rating)
                    .max()
            })
            .max()
    }
}

fn normalized(values: &[String]) -> Vec<String> {
    values.iter().map(|v| normalize(v)).collect()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> TagPreferences {
        TagPreferences {
            genres: vec!["genre1".into(), "badtag".into()],
            blacklist: vec!["badtag".into()],
            whitelist: vec!["tag1".into()],
            ..Default::default()
        }
    }

    fn mapper(include_unmatched: bool) -> TagMapper {
        TagMapper::new(Some(prefs()), include_unmatched, false)
    }

    fn tags(values: &[&str]) -> Vec<Tag> {
        values.iter().map(|v| Tag::new(*v)).collect()
    }

    // -----------------------------------------------------------------------
    // Normalization and mapping
    // -----------------------------------------------------------------------

    #[test]
    fn normalize_strips_and_lowercases() {
        assert_eq!(normalize("Slice of Life"), "sliceoflife");
        assert_eq!(normalize("slice-of-life!"), "sliceoflife");
        assert_eq!(normalize("MA15+"), "ma15");
    }

    #[test]
    fn map_tags_rewrites_value_and_identifier() {
        let mappings = vec![TagMapping {
            origin_tag: "Girls Love".into(),
            destination_tag: "Yuri".into(),
        }];
        let input = vec![Tag::scoped("girls-love", "", true), Tag::new("Action")];

        let mapped = map_tags(&mappings, &input);

        assert_eq!(mapped[0].value, "Yuri");
        assert_eq!(mapped[0].identifier(), "Yuri");
        assert_eq!(mapped[0].genre, Some(true));
        assert_eq!(mapped[1].value, "Action");
        assert_eq!(mapped[1].genre, None);
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[test]
    fn configured_genre_is_never_a_tag() {
        let out = mapper(true).classify(&tags(&["genre1"]));
        assert_eq!(out.genres, vec!["genre1"]);
        assert!(out.tags.is_empty());
    }

    #[test]
    fn blacklisted_genre_is_excluded_from_both() {
        let out = mapper(true).classify(&tags(&["badtag"]));
        assert!(out.genres.is_empty());
        assert!(out.tags.is_empty());
    }

    #[test]
    fn whitelisted_tag_is_a_tag() {
        let out = mapper(false).classify(&tags(&["tag1"]));
        assert!(out.genres.is_empty());
        assert_eq!(out.tags, vec!["tag1"]);
    }

    #[test]
    fn unmatched_needs_include_flag() {
        assert!(mapper(false).classify(&tags(&["other"])).tags.is_empty());
        assert_eq!(mapper(true).classify(&tags(&["other"])).tags, vec!["other"]);
    }

    #[test]
    fn mixed_input_joins_lists() {
        let out = mapper(true).classify(&tags(&["genre1", "tag1", "badtag", "extra"]));
        assert_eq!(out.genre_list(), "genre1");
        assert_eq!(out.tag_list(), "tag1, extra");
    }

    #[test]
    fn provider_scoped_genre_is_genre() {
        let out = mapper(false).classify(&[Tag::scoped("Romance", "romance-id", true)]);
        assert_eq!(out.genres, vec!["Romance"]);
        assert!(out.tags.is_empty());
    }

    #[test]
    fn mapping_runs_before_classification() {
        let prefs = TagPreferences {
            genres: vec!["genre2".into()],
            tag_mappings: vec![TagMapping {
                origin_tag: "genre1".into(),
                destination_tag: "genre2".into(),
            }],
            ..Default::default()
        };
        let out = TagMapper::new(Some(prefs), false, false).classify(&tags(&["genre1"]));
        assert_eq!(out.genre_list(), "genre2");
    }

    #[test]
    fn identifier_matches_lists() {
        let prefs = TagPreferences {
            blacklist: vec!["nsfw-id".into()],
            ..Default::default()
        };
        let out = TagMapper::new(Some(prefs), true, false)
            .classify(&[Tag::scoped("Spicy", "nsfw-id", false)]);
        assert!(out.tags.is_empty());
    }

    #[test]
    fn missing_preferences_classify_nothing() {
        for skip in [false, true] {
            let out = TagMapper::new(None, true, skip).classify(&tags(&["genre1", "tag1"]));
            assert_eq!(out, Classification::default());
        }
    }

    // -----------------------------------------------------------------------
    // Age rating
    // -----------------------------------------------------------------------

    fn rating_prefs(mappings: Vec<TagMapping>) -> TagPreferences {
        TagPreferences {
            tag_mappings: mappings,
            age_rating_mappings: vec![
                AgeRatingMapping {
                    tag: "MyTag".into(),
                    age_rating: AgeRating::Teen,
                },
                AgeRatingMapping {
                    tag: "MyOtherTag".into(),
                    age_rating: AgeRating::MatureA15,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn highest_rating_wins_across_series_and_chapter_tags() {
        let mapper = TagMapper::new(Some(rating_prefs(Vec::new())), false, false);
        let series_tags = tags(&["MyTag"]);
        let chapter_tags = tags(&["MyOtherTag"]);
        let all: Vec<Tag> = series_tags.into_iter().chain(chapter_tags).collect();

        assert_eq!(mapper.highest_age_rating(&all), Some(AgeRating::MatureA15));
    }

    #[test]
    fn tag_mapping_applies_before_rating() {
        let mapper = TagMapper::new(
            Some(rating_prefs(vec![TagMapping {
                origin_tag: "MyOtherTag".into(),
                destination_tag: "MyTag".into(),
            }])),
            false,
            false,
        );

        let rating = mapper.highest_age_rating(&tags(&["MyTag", "MyOtherTag"]));
        assert_eq!(rating, Some(AgeRating::Teen));
    }

    #[test]
    fn no_match_or_no_preferences_is_none() {
        let mapper = TagMapper::new(Some(rating_prefs(Vec::new())), false, false);
        assert_eq!(mapper.highest_age_rating(&tags(&["Unrelated"])), None);
        assert_eq!(TagMapper::default().highest_age_rating(&tags(&["MyTag"])), None);
    }

    #[test]
    fn age_rating_order_and_names() {
        assert!(AgeRating::Teen < AgeRating::MatureA15);
        assert!(AgeRating::MatureA15 < AgeRating::X18);
        assert!(AgeRating::Unknown < AgeRating::RatingPending);
        assert_eq!(AgeRating::MatureA15.to_string(), "MA15+");

        let parsed: AgeRating = serde_json::from_str("\"Adults Only 18+\"").unwrap();
        assert_eq!(parsed, AgeRating::AdultsOnly18);
    }
}
