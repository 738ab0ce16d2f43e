use reqwest::Url;

use crate::models::search::{ExperienceLevel, PostedWithin, SearchCriteria, WorkMode};

fn experience_filter(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Internship => "1",
        ExperienceLevel::Entry => "2",
        ExperienceLevel::Mid => "3,4",
        ExperienceLevel::Senior => "5,6",
    }
}

/// Seconds-based recency filter.
fn posted_filter(window: PostedWithin) -> &'static str {
    match window {
        PostedWithin::Day => "r86400",
        PostedWithin::Week => "r604800",
        PostedWithin::Month => "r2592000",
    }
}

fn work_mode_filter(mode: WorkMode) -> &'static str {
    match mode {
        WorkMode::Onsite => "1",
        WorkMode::Remote => "2",
        WorkMode::Hybrid => "3",
    }
}

/// Builds the job board search URL for the criteria.
pub fn build_search_url(base: &str, criteria: &SearchCriteria) -> Result<String, String> {
    let url = Url::parse_with_params(
        base,
        &[
            ("keywords", criteria.keywords.trim()),
            ("location", criteria.location.trim()),
            ("f_E", experience_filter(criteria.experience)),
            ("f_TPR", posted_filter(criteria.posted_within)),
            ("f_WT", work_mode_filter(criteria.work_mode)),
        ],
    )
    .map_err(|e| format!("invalid job search url `{base}`: {e}"))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_filtered_search_url() {
        let criteria = SearchCriteria {
            keywords: " data engineer ".to_string(),
            location: "New York".to_string(),
            experience: ExperienceLevel::Mid,
            posted_within: PostedWithin::Week,
            work_mode: WorkMode::Hybrid,
        };
        let url = build_search_url("https://www.linkedin.com/jobs/search/", &criteria).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(parsed.path(), "/jobs/search/");
        assert!(pairs.contains(&("keywords".to_string(), "data engineer".to_string())));
        assert!(pairs.contains(&("location".to_string(), "New York".to_string())));
        assert!(pairs.contains(&("f_E".to_string(), "3,4".to_string())));
        assert!(pairs.contains(&("f_TPR".to_string(), "r604800".to_string())));
        assert!(pairs.contains(&("f_WT".to_string(), "3".to_string())));
    }

    #[test]
    fn test_invalid_base_is_rejected() {
        let criteria = SearchCriteria {
            keywords: "rust".to_string(),
            location: "Berlin".to_string(),
            experience: ExperienceLevel::default(),
            posted_within: PostedWithin::default(),
            work_mode: WorkMode::default(),
        };
        assert!(build_search_url("not a url", &criteria).is_err());
    }
}
