pub mod histogram;
pub mod kmeans;
pub mod stopwords;
pub mod tfidf;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use kmeans::KMeans;

const PREVIEW_COUNT: usize = 3;
const PREVIEW_CHARS: usize = 200;
const TOP_TERMS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub size: usize,
    /// Highest-weighted centroid terms.
    pub top_terms: Vec<String>,
    /// First members in input order, truncated.
    pub previews: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub k: usize,
    pub vocabulary_size: usize,
    pub inertia: f64,
    /// Cluster id of each input description, by position.
    pub assignments: Vec<usize>,
    pub clusters: Vec<ClusterSummary>,
}

/// Result of one analysis run. The two empty cases are not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClusterOutcome {
    NoDescriptions,
    EmptyVocabulary,
    Clustered(ClusterReport),
}

pub struct Clusterer {
    pub seed: u64,
    pub n_init: usize,
}

impl Default for Clusterer {
    fn default() -> Self {
        Self { seed: 42, n_init: 10 }
    }
}

impl Clusterer {
    /// TF-IDF vectorize `descriptions` and partition them into `k` clusters.
    pub fn cluster(&self, descriptions: &[String], k: usize) -> Result<ClusterOutcome> {
        if k == 0 {
            bail!("cluster count must be at least 1");
        }
        if descriptions.is_empty() {
            warn!("No data available for clustering.");
            return Ok(ClusterOutcome::NoDescriptions);
        }

        let matrix = tfidf::fit_transform(descriptions);
        if matrix.vocabulary.is_empty() {
            warn!("Empty vocabulary; perhaps the documents only contain stop words.");
            return Ok(ClusterOutcome::EmptyVocabulary);
        }
        info!(
            "Vectorized {} descriptions over {} terms",
            descriptions.len(),
            matrix.vocabulary.len()
        );

        let fit = KMeans::new(k, self.n_init, self.seed).fit(&matrix.rows, matrix.vocabulary.len());

        let clusters = (0..k)
            .map(|id| {
                let members: Vec<&String> = descriptions
                    .iter()
                    .zip(&fit.labels)
                    .filter(|(_, &l)| l == id)
                    .map(|(d, _)| d)
                    .collect();
                ClusterSummary {
                    id,
                    size: members.len(),
                    top_terms: if members.is_empty() {
                        Vec::new()
                    } else {
                        top_terms(&fit.centroids[id], &matrix.vocabulary, TOP_TERMS)
                    },
                    previews: members
                        .iter()
                        .take(PREVIEW_COUNT)
                        .map(|d| preview(d))
                        .collect(),
                }
            })
            .collect();

        Ok(ClusterOutcome::Clustered(ClusterReport {
            k,
            vocabulary_size: matrix.vocabulary.len(),
            inertia: fit.inertia,
            assignments: fit.labels,
            clusters,
        }))
    }
}

impl ClusterReport {
    pub fn print(&self) {
        for c in &self.clusters {
            info!("Cluster {} contains {} gigs.", c.id + 1, c.size);
            println!("\nCluster {} ({} gigs): {}", c.id + 1, c.size, c.top_terms.join(", "));
            for p in &c.previews {
                println!("  {}", p);
            }
        }
    }
}

fn preview(s: &str) -> String {
    let truncated: String = s.chars().take(PREVIEW_CHARS).collect();
    format!("{} ...", truncated)
}

fn top_terms(centroid: &[f64], vocabulary: &[String], n: usize) -> Vec<String> {
    let mut idx: Vec<usize> = (0..centroid.len()).filter(|&i| centroid[i] > 0.0).collect();
    // Stable sort keeps vocabulary order among equal weights.
    idx.sort_by(|&a, &b| centroid[b].total_cmp(&centroid[a]));
    idx.into_iter().take(n).map(|i| vocabulary[i].clone()).collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn report(outcome: ClusterOutcome) -> ClusterReport {
        match outcome {
            ClusterOutcome::Clustered(r) => r,
            other => panic!("expected clusters, got {:?}", other),
        }
    }

    #[test]
    fn empty_input() {
        let out = Clusterer::default().cluster(&[], 5).unwrap();
        assert!(matches!(out, ClusterOutcome::NoDescriptions));
    }

    #[test]
    fn stop_words_only() {
        let out = Clusterer::default()
            .cluster(&docs(&["the and", "will you", "of the"]), 2)
            .unwrap();
        assert!(matches!(out, ClusterOutcome::EmptyVocabulary));
    }

    #[test]
    fn zero_clusters_rejected() {
        assert!(Clusterer::default().cluster(&docs(&["logo"]), 0).is_err());
    }

    #[test]
    fn logo_and_website_groups() {
        let d = docs(&[
            "fast logo design",
            "logo design expert",
            "website development",
            "full website build",
            "logo and branding",
        ]);
        let r = report(Clusterer::default().cluster(&d, 2).unwrap());
        let a = &r.assignments;
        assert_eq!(a[0], a[1]);
        assert_eq!(a[0], a[4]);
        assert_eq!(a[2], a[3]);
        assert_ne!(a[0], a[2]);

        let logo = &r.clusters[a[0]];
        assert_eq!(logo.size, 3);
        assert_eq!(logo.top_terms[0], "logo");
        assert_eq!(r.clusters[a[2]].top_terms[0], "website");
    }

    #[test]
    fn deterministic() {
        let d = docs(&[
            "seo audit for your website",
            "wordpress website fixes",
            "modern logo design",
            "minimalist logo",
            "youtube video editing",
            "video intro animation",
            "keyword research seo",
        ]);
        let c = Clusterer::default();
        let first = report(c.cluster(&d, 3).unwrap()).assignments;
        for _ in 0..5 {
            assert_eq!(report(c.cluster(&d, 3).unwrap()).assignments, first);
        }
    }

    #[test]
    fn more_clusters_than_points() {
        let d = docs(&["logo design", "website build"]);
        let r = report(Clusterer::default().cluster(&d, 5).unwrap());
        assert_eq!(r.clusters.len(), 5);
        assert_eq!(r.clusters.iter().map(|c| c.size).sum::<usize>(), 2);
        assert!(r.clusters.iter().filter(|c| c.size == 0).count() >= 3);
    }

    #[test]
    fn previews_truncated_and_ordered() {
        let long = "logo ".repeat(100);
        let d = docs(&[&long, "logo one", "logo two", "logo three"]);
        let r = report(Clusterer::default().cluster(&d, 1).unwrap());
        let c = &r.clusters[0];
        assert_eq!(c.size, 4);
        assert_eq!(c.previews.len(), 3);
        assert_eq!(c.previews[0].chars().count(), 200 + 4);
        assert!(c.previews[0].ends_with(" ..."));
        assert_eq!(c.previews[1], "logo one ...");
        assert_eq!(c.previews[2], "logo two ...");
    }

    #[test]
    fn report_serializes_with_outcome_tag() {
        let out = Clusterer::default().cluster(&[], 2).unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["outcome"], "no_descriptions");

        let out = Clusterer::default().cluster(&docs(&["logo design"]), 1).unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["outcome"], "clustered");
        assert_eq!(json["clusters"][0]["size"], 1);
    }
}
