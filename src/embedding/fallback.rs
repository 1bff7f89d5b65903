//! Deterministic fallback embedder for offline and test use.
//!
//! Projects standards-document text into a fixed-dimension space using
//! signed two-bucket feature hashing. Features are weighted by what
//! matters in this corpus: standard references (an `IEC 60364` citation
//! is a far stronger retrieval signal than a stop word) and numeric
//! tokens (values, section numbers, ratings) count more than plain
//! words, and adjacent-token bigrams capture phrases like "cable size".
//! Similarity reflects weighted lexical overlap, not semantics; the
//! scheme keeps the whole pipeline runnable without a provider and
//! anchors tests.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::extract::StandardFamily;

/// Weight of an ordinary word token.
const WORD_WEIGHT: f32 = 1.0;

/// Weight of a token carrying digits (values, ratings, section numbers).
const NUMERIC_WEIGHT: f32 = 2.0;

/// Weight of a recognised standard-reference feature.
const REFERENCE_WEIGHT: f32 = 3.0;

/// Weight of an adjacent-token bigram.
const BIGRAM_WEIGHT: f32 = 0.5;

/// 64-bit FNV-1a offset basis.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// 64-bit FNV-1a prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic weighted-lexical-overlap embedder.
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a fallback embedder with the given dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// FNV-1a over the feature name. Stable across platforms and
    /// processes, unlike the std hasher.
    fn fnv1a(feature: &str) -> u64 {
        let mut hash = FNV_OFFSET;
        for byte in feature.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Folds one feature into the vector: `+weight` at one hash-derived
    /// bucket, `-weight` at a second, so distinct features interfere
    /// destructively instead of piling up on single buckets.
    fn fold(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::fnv1a(feature);
        #[allow(clippy::cast_possible_truncation)]
        let plus = (hash as usize) % self.dimensions;
        #[allow(clippy::cast_possible_truncation)]
        let minus = ((hash >> 32) as usize) % self.dimensions;
        vector[plus] += weight;
        if plus != minus {
            vector[minus] -= weight;
        }
    }

    /// Lowercased alphanumeric token runs.
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    /// Standard-reference feature for a token pair or a fused token.
    ///
    /// `iec 60364` (family prefix followed by a number) and `iec60364`
    /// (fused) both yield `ref:IEC60364`, so spacing variants of the same
    /// citation land on the same buckets.
    fn reference_feature(previous: Option<&str>, token: &str) -> Option<String> {
        let is_family = |s: &str| {
            StandardFamily::ALL
                .iter()
                .any(|f| f.prefix().eq_ignore_ascii_case(s))
        };

        // Family prefix in the previous token: "iec" + "60364"
        if let Some(prev) = previous {
            if is_family(prev) && token.starts_with(|c: char| c.is_ascii_digit()) {
                return Some(format!("ref:{}{}", prev.to_uppercase(), token));
            }
        }
        // Fused form: "iec60364"
        let alpha_len = token.chars().take_while(char::is_ascii_alphabetic).count();
        if alpha_len > 0 && alpha_len < token.len() && is_family(&token[..alpha_len]) {
            return Some(format!("ref:{}", token.to_uppercase()));
        }
        None
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokenize(text);

        for (i, token) in tokens.iter().enumerate() {
            let previous = i.checked_sub(1).map(|p| tokens[p].as_str());

            if let Some(reference) = Self::reference_feature(previous, token) {
                self.fold(&mut vector, &reference, REFERENCE_WEIGHT);
            }

            let weight = if token.bytes().any(|b| b.is_ascii_digit()) {
                NUMERIC_WEIGHT
            } else {
                WORD_WEIGHT
            };
            self.fold(&mut vector, token, weight);

            if let Some(prev) = previous {
                self.fold(&mut vector, &format!("{prev} {token}"), BIGRAM_WEIGHT);
            }
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        use rayon::prelude::*;
        Ok(texts.par_iter().map(|t| self.generate(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    const DIMS: usize = 256;

    #[test]
    fn test_deterministic() {
        let embedder = FallbackEmbedder::new(DIMS);
        assert_eq!(
            embedder.embed("cable sizing").unwrap(),
            embedder.embed("cable sizing").unwrap()
        );
    }

    #[test]
    fn test_unit_norm() {
        let embedder = FallbackEmbedder::new(DIMS);
        let emb = embedder.embed("some text").unwrap();
        let magnitude: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_text_scores_higher() {
        let embedder = FallbackEmbedder::new(DIMS);
        let base = embedder.embed("maximum cable current rating").unwrap();
        let similar = embedder.embed("cable current rating table").unwrap();
        let unrelated = embedder.embed("emergency lighting luminaire spacing").unwrap();
        assert!(cosine_similarity(&base, &similar) > cosine_similarity(&base, &unrelated));
    }

    #[test]
    fn test_empty_text_zero_vector() {
        let embedder = FallbackEmbedder::new(DIMS);
        let emb = embedder.embed("").unwrap();
        assert!(emb.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_reference_feature_spacing_variants() {
        // Spaced and fused citations of the same standard produce the
        // same reference feature
        assert_eq!(
            FallbackEmbedder::reference_feature(Some("iec"), "60364"),
            Some("ref:IEC60364".to_string())
        );
        assert_eq!(
            FallbackEmbedder::reference_feature(None, "iec60364"),
            Some("ref:IEC60364".to_string())
        );
        // Ordinary words are not references
        assert_eq!(FallbackEmbedder::reference_feature(Some("the"), "60364"), None);
        assert_eq!(FallbackEmbedder::reference_feature(None, "cable"), None);
    }

    #[test]
    fn test_shared_standard_reference_dominates() {
        let embedder = FallbackEmbedder::new(DIMS);
        let base = embedder.embed("complies with IEC 60364").unwrap();
        let same_ref = embedder.embed("see IEC 60364").unwrap();
        let no_ref = embedder.embed("complies with the schedule").unwrap();
        // The heavily weighted shared citation outweighs shared plain words
        assert!(cosine_similarity(&base, &same_ref) > cosine_similarity(&base, &no_ref));
    }

    #[test]
    fn test_numeric_tokens_weighted() {
        let embedder = FallbackEmbedder::new(DIMS);
        let base = embedder.embed("rated 230 volts").unwrap();
        let same_value = embedder.embed("supply 230 volts").unwrap();
        let other_value = embedder.embed("rated 110 volts").unwrap();
        assert!(cosine_similarity(&base, &same_value) > cosine_similarity(&base, &other_value));
    }

    #[test]
    fn test_word_order_matters_through_bigrams() {
        let embedder = FallbackEmbedder::new(DIMS);
        let a = embedder.embed("cable size limits").unwrap();
        let same_order = embedder.embed("cable size limits apply").unwrap();
        let scrambled = embedder.embed("limits size cable").unwrap();
        assert!(cosine_similarity(&a, &same_order) > cosine_similarity(&a, &scrambled));
    }

    #[test]
    fn test_parallel_batch_matches_single() {
        let embedder = FallbackEmbedder::new(DIMS);
        let batch = embedder.embed_batch(&["one", "two"]).unwrap();
        assert_eq!(batch[0], embedder.embed("one").unwrap());
        assert_eq!(batch[1], embedder.embed("two").unwrap());
    }
}
