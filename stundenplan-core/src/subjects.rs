use std::collections::HashMap;

/// Static lookup from short subject codes to display names, plus the
/// per-subject notebook links shown next to the current lesson.
pub struct SubjectResolver {
    names: HashMap<String, String>,
    notebooks: HashMap<String, String>,
}

impl SubjectResolver {
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
            notebooks: HashMap::new(),
        }
    }

    /// Register a code → display name mapping. Codes are compared
    /// case-insensitively, so "m" and "M" resolve identically.
    pub fn add_subject(&mut self, code: &str, name: &str) {
        self.names.insert(code.to_lowercase(), name.to_string());
    }

    pub fn add_notebook(&mut self, subject_name: &str, url: &str) {
        self.notebooks
            .insert(subject_name.to_string(), url.to_string());
    }

    /// Resolve a subject code; unknown codes pass through unchanged.
    pub fn resolve(&self, code: &str) -> String {
        self.names
            .get(&code.to_lowercase())
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    /// Notebook link for a resolved subject name, if one is configured.
    pub fn notebook_link(&self, subject_name: &str) -> Option<&str> {
        self.notebooks.get(subject_name).map(String::as_str)
    }
}

impl Default for SubjectResolver {
    fn default() -> Self {
        let mut resolver = Self::new();

        for (code, name) in [
            ("M", "Mathematik"),
            ("D", "Deutsch"),
            ("E", "Englisch"),
            ("F", "Französisch"),
            ("It", "Italienisch"),
            ("L", "Latein"),
            ("B", "Biologie"),
            ("Ch", "Chemie"),
            ("Ph", "Physik"),
            ("G", "Geschichte"),
            ("Gg", "Geografie"),
            ("WR", "Wirtschaft und Recht"),
            ("Inf", "Informatik"),
            ("BG", "Bildnerisches Gestalten"),
            ("Mu", "Musik"),
            ("Sp", "Sport"),
            ("Rel", "Religion"),
            ("Phi", "Philosophie"),
        ] {
            resolver.add_subject(code, name);
        }

        resolver.add_notebook(
            "Mathematik",
            "https://www.onenote.com/notebooks/mathematik",
        );
        resolver.add_notebook("Physik", "https://www.onenote.com/notebooks/physik");
        resolver.add_notebook("Chemie", "https://www.onenote.com/notebooks/chemie");
        resolver.add_notebook("Deutsch", "https://www.onenote.com/notebooks/deutsch");
        resolver.add_notebook("Englisch", "https://www.onenote.com/notebooks/englisch");

        resolver
    }
}
