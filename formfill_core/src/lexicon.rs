use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------
// Label lexicon: synonym groups and stopwords used by label similarity.
// Injected read-only per session; never looked up globally.
// ---------------------------------------------------------------------

/// Token -> synonym group key, plus words that carry no label signal.
#[derive(Clone, Debug, Default)]
pub struct Lexicon {
    groups: BTreeMap<String, String>,
    stopwords: BTreeSet<String>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synonym group. The first word is the group key.
    pub fn add_group(&mut self, words: &[&str]) {
        let Some(key) = words.first() else { return };
        for w in words {
            self.groups.insert(w.to_lowercase(), key.to_lowercase());
        }
    }

    pub fn add_stopwords(&mut self, words: &[&str]) {
        self.stopwords.extend(words.iter().map(|w| w.to_lowercase()));
    }

    /// True when two distinct tokens belong to the same group.
    pub fn synonyms(&self, a: &str, b: &str) -> bool {
        match (self.groups.get(a), self.groups.get(b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    /// Lowercased alphanumeric tokens with stopwords removed.
    pub fn label_tokens<S: AsRef<str>>(&self, words: &[S]) -> Vec<String> {
        let mut out = Vec::new();
        for w in words {
            for t in w.as_ref().split(|c: char| !c.is_alphanumeric()) {
                let t = t.to_lowercase();
                if !t.is_empty() && !self.stopwords.contains(&t) && !out.contains(&t) {
                    out.push(t);
                }
            }
        }
        out
    }

    /// A small English lexicon for Indian government forms.
    /// These are relative hints; callers may extend or replace them.
    pub fn default_en() -> Self {
        let mut lx = Lexicon::new();

        lx.add_group(&["phone", "mobile", "cell", "contact", "telephone", "tel"]);
        lx.add_group(&["email", "mail", "emailid"]);
        lx.add_group(&["birth", "dob", "born", "birthday"]);
        lx.add_group(&["pincode", "pin", "postal", "zip", "postcode"]);
        lx.add_group(&["address", "residence", "addr", "house"]);
        lx.add_group(&["current", "present", "correspondence", "communication"]);
        lx.add_group(&["permanent", "native", "home"]);
        lx.add_group(&["name", "fullname"]);
        lx.add_group(&["father", "dad", "guardian"]);
        lx.add_group(&["mother", "mom", "mum"]);
        lx.add_group(&["spouse", "husband", "wife"]);
        lx.add_group(&["aadhaar", "aadhar", "uid", "uidai"]);
        lx.add_group(&["city", "town", "village", "district"]);
        lx.add_group(&["state", "province"]);
        lx.add_group(&["street", "road", "lane", "locality"]);

        lx.add_stopwords(&[
            "a", "an", "the", "of", "my", "your", "is", "are", "it", "its", "please", "and", "in", "at", "to",
            "for", "i", "me", "this", "that", "enter",
        ]);

        lx
    }
}
