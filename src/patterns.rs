use ahash::{AHashMap, AHashSet};

/// Canonical token sequence standing in for a cluster of similar lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representative {
    pub tokens: Vec<String>,
    pub text: String,
    pub count: usize,
}

/// Representatives of one tag in discovery order.
#[derive(Debug, Default, Clone)]
struct TagClusters {
    reps: Vec<Representative>,
    by_text: AHashMap<String, usize>,
}

/// Per-tag similarity clusters.
///
/// There is no eviction: a tag keeps every representative it ever discovered
/// until the table is cleared.
#[derive(Debug, Default, Clone)]
pub struct ClusterTable {
    tags: AHashMap<String, TagClusters>,
    // first-seen order of tags, so snapshots do not depend on hash order
    tag_order: Vec<String>,
    total: usize,
}

/// Share of the incoming tokens that also occur in the representative.
///
/// The denominator is the incoming line's token count (at least 1), not the
/// representative's, so the measure is asymmetric.
pub fn similarity(incoming: &[String], representative: &[String]) -> f64 {
    let rep: AHashSet<&str> = representative.iter().map(String::as_str).collect();
    let common = incoming
        .iter()
        .map(String::as_str)
        .collect::<AHashSet<&str>>()
        .intersection(&rep)
        .count();
    common as f64 / incoming.len().max(1) as f64
}

impl ClusterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `tokens` to the first representative of `tag` scoring at least
    /// `granularity`, or start a new one. Returns the chosen representative's
    /// text; its count has already been incremented.
    pub fn assign(&mut self, tag: &str, tokens: &[String], granularity: f64) -> &str {
        if !self.tags.contains_key(tag) {
            self.tag_order.push(tag.to_string());
        }
        let clusters = self.tags.entry(tag.to_string()).or_default();

        let idx = match clusters
            .reps
            .iter()
            .position(|rep| similarity(tokens, &rep.tokens) >= granularity)
        {
            Some(idx) => idx,
            None => {
                let text = tokens.join(" ");
                // one representative per (tag, text): an identical line that
                // still scored low (e.g. no tokens) joins the existing one
                let existing = clusters.by_text.get(&text).copied();
                match existing {
                    Some(idx) => idx,
                    None => {
                        clusters.by_text.insert(text.clone(), clusters.reps.len());
                        clusters.reps.push(Representative { tokens: tokens.to_vec(), text, count: 0 });
                        self.total += 1;
                        clusters.reps.len() - 1
                    }
                }
            }
        };

        let rep = &mut clusters.reps[idx];
        rep.count += 1;
        &rep.text
    }

    pub fn representatives(&self, tag: &str) -> &[Representative] {
        self.tags.get(tag).map(|c| c.reps.as_slice()).unwrap_or(&[])
    }

    /// (tag, representative) pairs, tags in first-seen order and
    /// representatives in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Representative)> + '_ {
        self.tag_order.iter().flat_map(move |tag| {
            self.representatives(tag).iter().map(move |rep| (tag.as_str(), rep))
        })
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.tag_order.iter().map(String::as_str)
    }

    /// Number of representatives across all tags.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.tag_order.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.tag_order.clear();
        self.total = 0;
    }
}
