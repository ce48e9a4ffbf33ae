use serde::Serialize;
use std::path::{Path, PathBuf};

/// A built-in trend format.
#[derive(Debug, Clone, Copy)]
pub struct Trend {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub base_video: &'static str,
    pub music: &'static str,
    pub thumbnail: &'static str,
    pub voice_id: &'static str,
}

pub const TRENDS: &[Trend] = &[
    Trend {
        id: "im_x_of_course_i_y",
        title: "I'm X, of course I Y",
        description: "Fill the blanks for a classic self-referential meme format.",
        template: "I'm {x}, of course I {y}.",
        base_video: "base.mp4",
        music: "music.mp3",
        thumbnail: "thumb.png",
        voice_id: "21m00Tcm4TlvDq8ikWAM",
    },
    Trend {
        id: "day_in_the_life",
        title: "Day in the life of…",
        description: "Mini-vlog format with snappy cuts.",
        template: "A day in the life of {subject}: {steps}",
        base_video: "base.mp4",
        music: "music.mp3",
        thumbnail: "thumb.png",
        voice_id: "21m00Tcm4TlvDq8ikWAM",
    },
    Trend {
        id: "when_you_but",
        title: "When you [situation] but [unexpected ending]",
        description: "Setup and punchline with a twist.",
        template: "When you {situation} but {twist}.",
        base_video: "base.mp4",
        music: "music.mp3",
        thumbnail: "thumb.png",
        voice_id: "21m00Tcm4TlvDq8ikWAM",
    },
];

pub fn find_trend(id: &str) -> Option<&'static Trend> {
    TRENDS.iter().find(|t| t.id == id)
}

impl Trend {
    pub fn asset_dir(&self, assets_dir: &Path) -> PathBuf {
        assets_dir.join("trends").join(self.id)
    }

    pub fn base_video_path(&self, assets_dir: &Path) -> PathBuf {
        self.asset_dir(assets_dir).join(self.base_video)
    }

    pub fn music_path(&self, assets_dir: &Path) -> PathBuf {
        self.asset_dir(assets_dir).join(self.music)
    }

    /// Catalog entry with absolute asset URLs under `api_base`.
    pub fn summary(&self, api_base: &str) -> TrendSummary {
        let api_base = api_base.trim_end_matches('/');
        TrendSummary {
            id: self.id,
            title: self.title,
            description: self.description,
            template: self.template,
            thumbnail_url: format!("{}/assets/trends/{}/{}", api_base, self.id, self.thumbnail),
            audio_sample_url: format!("{}/assets/trends/{}/{}", api_base, self.id, self.music),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub template: &'static str,
    pub thumbnail_url: String,
    pub audio_sample_url: String,
}

/// Body of `GET /trends`.
#[derive(Debug, Clone, Serialize)]
pub struct TrendList {
    pub trends: Vec<TrendSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_trend() {
        assert_eq!(find_trend("when_you_but").unwrap().title, "When you [situation] but [unexpected ending]");
        assert!(find_trend("nope").is_none());
    }

    #[test]
    fn test_summary_urls() {
        let trend = find_trend("day_in_the_life").unwrap();
        let summary = trend.summary("http://localhost:8000/");
        assert_eq!(
            summary.thumbnail_url,
            "http://localhost:8000/assets/trends/day_in_the_life/thumb.png"
        );
        assert!(summary.audio_sample_url.ends_with("/music.mp3"));
    }

    #[test]
    fn test_asset_paths() {
        let trend = find_trend("im_x_of_course_i_y").unwrap();
        assert_eq!(
            trend.base_video_path(Path::new("/srv/assets")),
            PathBuf::from("/srv/assets/trends/im_x_of_course_i_y/base.mp4")
        );
    }
}
