//! Keyword groups.
//!
//! A group is a named topic filter over the video corpus, configured with
//! `[[groups]]` tables. A video belongs to a group when its caption or
//! hashtags mention one of the group's keywords and none of its exclude
//! keywords.
//!
//! Groups can also be managed at runtime through [`GroupRegistry`], which
//! persists the full list as JSON. Once that file exists it replaces the
//! `[[groups]]` tables.

use anyhow::{bail, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::{Dataset, VideoRecord};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct KeywordGroup {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    /// Require whole-word matches instead of substrings.
    #[serde(default)]
    pub exact_match: bool,
}

impl KeywordGroup {
    pub fn matches(&self, video: &VideoRecord) -> bool {
        let text = searchable_text(video);

        if self
            .exclude_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && text.contains(&k))
        {
            return false;
        }

        self.keywords.iter().any(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() {
                return false;
            }
            if self.exact_match {
                match word_pattern(&keyword) {
                    Some(re) => re.is_match(&text),
                    None => false,
                }
            } else {
                text.contains(&keyword)
            }
        })
    }
}

/// Caption plus hashtags, lowercased.
fn searchable_text(video: &VideoRecord) -> String {
    let mut text = video.caption.to_lowercase();
    for tag in &video.hashtags {
        text.push(' ');
        text.push_str(&tag.to_lowercase());
    }
    text
}

fn word_pattern(keyword: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
        .case_insensitive(true)
        .build()
        .map_err(|e| tracing::warn!(keyword, error = %e, "invalid keyword pattern"))
        .ok()
}

/// Videos belonging to `group`, in corpus order.
pub fn filter_videos(videos: &[VideoRecord], group: &KeywordGroup) -> Vec<VideoRecord> {
    videos.iter().filter(|v| group.matches(v)).cloned().collect()
}

/// The group's videos plus the comments left on them.
pub fn filter_dataset(data: &Dataset, group: &KeywordGroup) -> Dataset {
    let videos = filter_videos(&data.videos, group);
    let ids: HashSet<&str> = videos.iter().map(|v| v.id.as_str()).collect();
    let comments = data
        .comments
        .iter()
        .filter(|c| ids.contains(c.video_id.as_str()))
        .cloned()
        .collect();
    Dataset::new(videos, comments)
}

pub fn find_group<'a>(groups: &'a [KeywordGroup], name: &str) -> Option<&'a KeywordGroup> {
    groups.iter().find(|g| g.name.eq_ignore_ascii_case(name))
}

/// Mutable group list backed by a JSON file.
#[derive(Debug, Clone)]
pub struct GroupRegistry {
    path: PathBuf,
    groups: Vec<KeywordGroup>,
}

impl GroupRegistry {
    /// Read the persisted list, or start from `seed` when the file does
    /// not exist yet.
    pub async fn load(path: PathBuf, seed: &[KeywordGroup]) -> Result<Self> {
        let groups = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Invalid groups file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => seed.to_vec(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Ok(Self { path, groups })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::load(config.cache.groups_path.clone(), &config.groups).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn groups(&self) -> &[KeywordGroup] {
        &self.groups
    }

    pub fn find(&self, name: &str) -> Option<&KeywordGroup> {
        find_group(&self.groups, name)
    }

    /// Insert `group`, replacing any group with the same name, and persist.
    pub async fn upsert(&mut self, mut group: KeywordGroup) -> Result<()> {
        group.name = group.name.trim().to_string();
        if group.name.is_empty() {
            bail!("group name must not be empty");
        }
        self.groups.retain(|g| !g.name.eq_ignore_ascii_case(&group.name));
        self.groups.push(group);
        self.save().await
    }

    /// Remove the named group and persist. Returns false when no group
    /// had that name.
    pub async fn remove(&mut self, name: &str) -> Result<bool> {
        let before = self.groups.len();
        self.groups.retain(|g| !g.name.eq_ignore_ascii_case(name.trim()));
        if self.groups.len() == before {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&self.groups)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), groups = self.groups.len(), "saved groups");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(caption: &str, hashtags: &[&str]) -> VideoRecord {
        VideoRecord {
            id: caption.into(),
            caption: caption.into(),
            hashtags: hashtags.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn group(keywords: &[&str], exclude: &[&str], exact_match: bool) -> KeywordGroup {
        KeywordGroup {
            name: "g".into(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            exclude_keywords: exclude.iter().map(|s| s.to_string()).collect(),
            exact_match,
        }
    }

    #[test]
    fn test_substring_match_includes_hashtags() {
        let g = group(&["cook"], &[], false);
        assert!(g.matches(&video("Sunday Cooking vlog", &[])));
        assert!(g.matches(&video("dinner", &["cookbook"])));
        assert!(!g.matches(&video("dinner", &["food"])));
    }

    #[test]
    fn test_exact_match_requires_whole_word() {
        let g = group(&["cook"], &[], true);
        assert!(!g.matches(&video("Sunday Cooking vlog", &[])));
        assert!(g.matches(&video("Let him COOK", &[])));
        assert!(g.matches(&video("dinner", &["cook"])));
    }

    #[test]
    fn test_exclude_wins() {
        let g = group(&["recipe"], &["sponsored"], false);
        assert!(g.matches(&video("easy recipe", &[])));
        assert!(!g.matches(&video("easy recipe", &["Sponsored"])));
    }

    #[test]
    fn test_exact_match_escapes_keyword() {
        let g = group(&["c++"], &[], true);
        assert!(!g.matches(&video("learning cpp", &[])));
        let g = group(&["a.b"], &[], true);
        assert!(!g.matches(&video("axb", &[])));
    }

    #[test]
    fn test_filter_keeps_order() {
        let videos = vec![video("cats one", &[]), video("dogs", &[]), video("cats two", &[])];
        let filtered = filter_videos(&videos, &group(&["cats"], &[], false));
        let ids: Vec<&str> = filtered.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["cats one", "cats two"]);
    }

    #[test]
    fn test_filter_dataset_keeps_group_comments() {
        use crate::models::CommentRecord;
        let comment = |video_id: &str| CommentRecord {
            id: "1".into(),
            video_id: video_id.into(),
            ..Default::default()
        };
        let data = Dataset::new(
            vec![video("cats", &[]), video("dogs", &[])],
            vec![comment("cats"), comment("dogs")],
        );
        let filtered = filter_dataset(&data, &group(&["cats"], &[], false));
        assert_eq!(filtered.videos.len(), 1);
        assert_eq!(filtered.comments, vec![comment("cats")]);
        assert!(find_group(&[group(&[], &[], false)], "G").is_some());
    }

    fn named(name: &str, keywords: &[&str]) -> KeywordGroup {
        KeywordGroup {
            name: name.into(),
            ..group(keywords, &[], false)
        }
    }

    #[tokio::test]
    async fn test_registry_seeds_from_config_until_saved() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("groups.json");
        let registry = GroupRegistry::load(path.clone(), &[named("food", &["recipe"])])
            .await
            .unwrap();
        assert_eq!(registry.groups().len(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_registry_upsert_replaces_by_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data").join("groups.json");
        let mut registry = GroupRegistry::load(path.clone(), &[named("food", &["recipe"])])
            .await
            .unwrap();

        registry.upsert(named("tech", &["ai"])).await.unwrap();
        registry.upsert(named(" FOOD ", &["pasta"])).await.unwrap();

        let names: Vec<&str> = registry.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["tech", "FOOD"]);
        assert_eq!(registry.find("food").unwrap().keywords, vec!["pasta"]);
        assert!(registry.upsert(named("  ", &[])).await.is_err());

        // The persisted list wins over the seed on reload.
        let reloaded = GroupRegistry::load(path, &[named("other", &[])]).await.unwrap();
        assert_eq!(reloaded.groups(), registry.groups());
    }

    #[tokio::test]
    async fn test_registry_remove_persists() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("groups.json");
        let seed = [named("food", &["recipe"]), named("tech", &["ai"])];
        let mut registry = GroupRegistry::load(path.clone(), &seed).await.unwrap();

        assert!(registry.remove("Food").await.unwrap());
        assert!(!registry.remove("food").await.unwrap());

        let reloaded = GroupRegistry::load(path, &seed).await.unwrap();
        let names: Vec<&str> = reloaded.groups().iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["tech"]);
    }
}
