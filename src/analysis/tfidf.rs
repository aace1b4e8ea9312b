use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::stopwords::is_stop_word;

/// Runs of two or more word characters.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// Sparse row: `(feature index, weight)` pairs sorted by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVec {
    pub entries: Vec<(usize, f64)>,
}

impl SparseVec {
    pub fn norm_sq(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v * v).sum()
    }

    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.entries.iter().map(|&(i, v)| v * dense[i]).sum()
    }

    pub fn to_dense(&self, dim: usize) -> Vec<f64> {
        let mut out = vec![0.0; dim];
        for &(i, v) in &self.entries {
            out[i] = v;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    /// Feature names, sorted; index `j` is column `j` of every row.
    pub vocabulary: Vec<String>,
    pub rows: Vec<SparseVec>,
}

/// Lowercased tokens of `text` with English stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Raw term counts × smoothed idf, rows L2-normalized.
pub fn fit_transform(docs: &[String]) -> TfidfMatrix {
    let counts: Vec<BTreeMap<String, usize>> = docs
        .iter()
        .map(|d| {
            let mut tf = BTreeMap::new();
            for tok in tokenize(d) {
                *tf.entry(tok).or_insert(0) += 1;
            }
            tf
        })
        .collect();

    let mut df: BTreeMap<&str, usize> = BTreeMap::new();
    for tf in &counts {
        for term in tf.keys() {
            *df.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let n = docs.len() as f64;
    let vocabulary: Vec<String> = df.keys().map(|t| t.to_string()).collect();
    let index: HashMap<&str, usize> = df.keys().enumerate().map(|(i, t)| (*t, i)).collect();
    let idf: Vec<f64> = df
        .values()
        .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
        .collect();

    let rows = counts
        .iter()
        .map(|tf| {
            // BTreeMap iteration keeps entries sorted by term, so by index too.
            let mut entries: Vec<(usize, f64)> = tf
                .iter()
                .map(|(term, &c)| {
                    let j = index[term.as_str()];
                    (j, c as f64 * idf[j])
                })
                .collect();
            let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for e in &mut entries {
                    e.1 /= norm;
                }
            }
            SparseVec { entries }
        })
        .collect();

    TfidfMatrix { vocabulary, rows }
}
