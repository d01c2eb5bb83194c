use std::collections::BTreeMap;
use tracing::debug;

/// A document whose text units can be read and rewritten in place.
pub trait UnitHost {
    fn unit_ids(&self) -> Vec<usize>;
    fn is_attached(&self, id: usize) -> bool;
    fn current_text(&self, id: usize) -> Option<&str>;
    fn replace_text(&mut self, id: usize, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub id: usize,
    pub text: String,
    ending: String,
    attached: bool,
}

impl TextUnit {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            ending: String::new(),
            attached: true,
        }
    }

    /// Line terminator that followed the unit in the source, if any.
    pub fn ending(&self) -> &str {
        &self.ending
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Plain-text document where every line is one text unit. Line terminators
/// (`\n` or `\r\n`) stay outside the unit text and are written back as found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    units: Vec<TextUnit>,
}

impl Page {
    pub fn from_text(text: &str) -> Self {
        let units = text
            .split_inclusive('\n')
            .enumerate()
            .map(|(id, line)| {
                let body = line
                    .strip_suffix("\r\n")
                    .or_else(|| line.strip_suffix('\n'))
                    .unwrap_or(line);
                let mut unit = TextUnit::new(id, body);
                unit.ending = line[body.len()..].to_string();
                unit
            })
            .collect();
        Self { units }
    }

    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    pub fn detach(&mut self, id: usize) {
        if let Some(unit) = self.units.get_mut(id) {
            unit.attached = false;
        }
    }

    pub fn render(&self) -> String {
        self.units
            .iter()
            .filter(|unit| unit.attached)
            .flat_map(|unit| [unit.text.as_str(), unit.ending.as_str()])
            .collect()
    }
}

impl UnitHost for Page {
    fn unit_ids(&self) -> Vec<usize> {
        self.units.iter().map(|unit| unit.id).collect()
    }

    fn is_attached(&self, id: usize) -> bool {
        self.units.get(id).map(TextUnit::is_attached).unwrap_or(false)
    }

    fn current_text(&self, id: usize) -> Option<&str> {
        self.units.get(id).map(|unit| unit.text.as_str())
    }

    fn replace_text(&mut self, id: usize, text: &str) {
        if let Some(unit) = self.units.get_mut(id) {
            unit.text = text.to_string();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationState {
    is_translated: bool,
    original: Option<String>,
}

impl TranslationState {
    pub fn is_translated(&self) -> bool {
        self.is_translated
    }

    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct MutationTracker {
    states: BTreeMap<usize, TranslationState>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_translated(&self, id: usize) -> bool {
        self.states
            .get(&id)
            .map(TranslationState::is_translated)
            .unwrap_or(false)
    }

    pub fn state(&self, id: usize) -> Option<&TranslationState> {
        self.states.get(&id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Returns whether the unit's text was replaced.
    pub fn apply<H: UnitHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: usize,
        translated: Option<&str>,
    ) -> bool {
        let Some(translated) = translated else {
            return false;
        };
        if !host.is_attached(id) {
            debug!("tracker: unit {} detached, skipping", id);
            return false;
        }
        let Some(current) = host.current_text(id) else {
            return false;
        };
        let state = self.states.entry(id).or_default();
        if state.original.is_none() {
            state.original = Some(current.to_string());
        }
        state.is_translated = true;
        host.replace_text(id, translated);
        true
    }

    /// Writes every captured original back and forgets all tracked units.
    /// Returns how many units were rewritten.
    pub fn restore_all<H: UnitHost + ?Sized>(&mut self, host: &mut H) -> usize {
        let mut restored = 0;
        for (id, state) in std::mem::take(&mut self.states) {
            let Some(original) = state.original else {
                continue;
            };
            if host.is_attached(id) {
                host.replace_text(id, &original);
                restored += 1;
            }
        }
        restored
    }
}
