//! Text vectorisation
//!
//! TF-IDF over word or character n-grams. Used by pipelines to turn the
//! comment text column into numeric features before a learner sees it.

use crate::error::{Result, StackError};
use ndarray::{Array1, Array2};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What an n-gram is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// Tokens matched by the token pattern
    Word,
    /// Character n-grams inside word boundaries, padded with one space
    Char,
}

/// TF-IDF vectoriser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfConfig {
    pub analyzer: Analyzer,
    pub ngram_range: (usize, usize),
    pub max_features: Option<usize>,
    /// Minimum number of documents a term must appear in
    pub min_df: usize,
    /// Replace tf with 1 + ln(tf)
    pub sublinear_tf: bool,
    pub lowercase: bool,
    pub token_pattern: String,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            analyzer: Analyzer::Word,
            ngram_range: (1, 1),
            max_features: Some(50_000),
            min_df: 1,
            sublinear_tf: true,
            lowercase: true,
            token_pattern: r"\w{1,}".to_string(),
        }
    }
}

impl TfidfConfig {
    pub fn words() -> Self {
        Self::default()
    }

    pub fn chars(min_n: usize, max_n: usize) -> Self {
        Self {
            analyzer: Analyzer::Char,
            ngram_range: (min_n, max_n),
            ..Self::default()
        }
    }

    pub fn with_ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = (min.max(1), max.max(min.max(1)));
        self
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n);
        self
    }

    pub fn with_min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    pub fn with_sublinear_tf(mut self, sublinear: bool) -> Self {
        self.sublinear_tf = sublinear;
        self
    }
}

/// TF-IDF vectoriser with smooth idf and L2 row normalisation
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    token_re: Option<Regex>,
    vocabulary: HashMap<String, usize>,
    terms: Vec<String>,
    idf: Option<Array1<f64>>,
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            token_re: None,
            vocabulary: HashMap::new(),
            terms: Vec::new(),
            idf: None,
        }
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    fn compile(&self) -> Result<Regex> {
        Regex::new(&self.config.token_pattern).map_err(|e| StackError::InvalidParameter {
            name: "token_pattern".to_string(),
            value: self.config.token_pattern.clone(),
            reason: e.to_string(),
        })
    }

    fn tokens<'a>(re: &Regex, text: &'a str) -> Vec<&'a str> {
        re.find_iter(text).map(|m| m.as_str()).collect()
    }

    fn ngrams(&self, re: &Regex, doc: &str) -> Vec<String> {
        let text = if self.config.lowercase {
            doc.to_lowercase()
        } else {
            doc.to_string()
        };
        let (min_n, max_n) = self.config.ngram_range;
        let mut out = Vec::new();

        match self.config.analyzer {
            Analyzer::Word => {
                let tokens = Self::tokens(re, &text);
                for n in min_n..=max_n {
                    if tokens.len() >= n {
                        for window in tokens.windows(n) {
                            out.push(window.join(" "));
                        }
                    }
                }
            }
            Analyzer::Char => {
                for word in text.split_whitespace() {
                    let padded: Vec<char> = format!(" {} ", word).chars().collect();
                    for n in min_n..=max_n {
                        if padded.len() < n {
                            break;
                        }
                        for window in padded.windows(n) {
                            out.push(window.iter().collect());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        if documents.is_empty() {
            return Err(StackError::InsufficientData("no documents to fit on".to_string()));
        }
        let re = self.compile()?;

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let unique: HashSet<String> = self.ngrams(&re, doc).into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df)
            .collect();
        // Most frequent first; ties broken alphabetically for a stable vocabulary
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max_n) = self.config.max_features {
            kept.truncate(max_n);
        }
        if kept.is_empty() {
            return Err(StackError::InsufficientData(
                "empty vocabulary after pruning".to_string(),
            ));
        }

        let n_docs = documents.len() as f64;
        let idf: Array1<f64> = kept
            .iter()
            .map(|(_, df)| ((n_docs + 1.0) / (*df as f64 + 1.0)).ln() + 1.0)
            .collect();

        self.terms = kept.into_iter().map(|(term, _)| term).collect();
        self.vocabulary = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        self.idf = Some(idf);
        self.token_re = Some(re);
        Ok(())
    }

    pub fn transform(&self, documents: &[String]) -> Result<Array2<f64>> {
        let (idf, re) = match (&self.idf, &self.token_re) {
            (Some(idf), Some(re)) => (idf, re),
            _ => return Err(StackError::NotFitted),
        };

        let mut out = Array2::zeros((documents.len(), self.terms.len()));
        for (i, doc) in documents.iter().enumerate() {
            let mut counts: HashMap<usize, f64> = HashMap::new();
            for term in self.ngrams(re, doc) {
                if let Some(&j) = self.vocabulary.get(&term) {
                    *counts.entry(j).or_insert(0.0) += 1.0;
                }
            }
            for (j, tf) in counts {
                let tf = if self.config.sublinear_tf { 1.0 + tf.ln() } else { tf };
                out[[i, j]] = tf * idf[j];
            }
            let norm = out.row(i).iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                out.row_mut(i).mapv_inplace(|v| v / norm);
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<Array2<f64>> {
        self.fit(documents)?;
        self.transform(documents)
    }

    /// Vocabulary in column order
    pub fn feature_names(&self) -> &[String] {
        &self.terms
    }

    pub fn describe(&self) -> String {
        let c = &self.config;
        format!(
            "tfidf({:?}, ngram={}..={}, max_features={:?}, min_df={}, sublinear={})",
            c.analyzer, c.ngram_range.0, c.ngram_range.1, c.max_features, c.min_df, c.sublinear_tf
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<String> {
        vec![
            "you are a nice person".to_string(),
            "you are an idiot".to_string(),
            "nice edit, thanks".to_string(),
        ]
    }

    #[test]
    fn test_word_tfidf_rows_are_unit_norm() {
        let mut v = TfidfVectorizer::new(TfidfConfig::words());
        let m = v.fit_transform(&docs()).unwrap();
        assert_eq!(m.nrows(), 3);
        for row in m.rows() {
            let norm: f64 = row.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_vocabulary_is_stable() {
        let mut a = TfidfVectorizer::new(TfidfConfig::words());
        let mut b = TfidfVectorizer::new(TfidfConfig::words());
        a.fit(&docs()).unwrap();
        b.fit(&docs()).unwrap();
        assert_eq!(a.feature_names(), b.feature_names());
        // "you", "are" and "nice" appear twice and lead the vocabulary
        assert_eq!(&a.feature_names()[..3], &["are", "nice", "you"]);
    }

    #[test]
    fn test_char_ngrams() {
        let mut v = TfidfVectorizer::new(TfidfConfig::chars(2, 3).with_max_features(1000));
        v.fit(&docs()).unwrap();
        assert!(v.feature_names().iter().any(|t| t == " y"));
        assert!(v.feature_names().iter().any(|t| t == "you"));
    }

    #[test]
    fn test_max_features_and_unseen_terms() {
        let mut v = TfidfVectorizer::new(TfidfConfig::words().with_max_features(2));
        v.fit(&docs()).unwrap();
        assert_eq!(v.feature_names().len(), 2);
        let m = v.transform(&["completely unseen".to_string()]).unwrap();
        assert!(m.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_transform_before_fit() {
        let v = TfidfVectorizer::new(TfidfConfig::default());
        assert!(matches!(v.transform(&docs()), Err(StackError::NotFitted)));
    }
}
