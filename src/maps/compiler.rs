use crate::store::BlockEntry;

/// The four output maps, one per `(test_mode, is_regex)` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    EnforceLiteral,
    EnforcePattern,
    TestLiteral,
    TestPattern,
}

impl MapKind {
    pub const ALL: [MapKind; 4] = [
        MapKind::EnforceLiteral,
        MapKind::EnforcePattern,
        MapKind::TestLiteral,
        MapKind::TestPattern,
    ];

    pub fn of(entry: &BlockEntry) -> Self {
        match (entry.test_mode, entry.is_regex) {
            (false, false) => MapKind::EnforceLiteral,
            (false, true) => MapKind::EnforcePattern,
            (true, false) => MapKind::TestLiteral,
            (true, true) => MapKind::TestPattern,
        }
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, MapKind::EnforcePattern | MapKind::TestPattern)
    }

    fn render(self, pattern: &str) -> String {
        if self.is_pattern() {
            // Inserted verbatim: a broken regex is the data owner's problem.
            format!("/{pattern}/ REJECT\n")
        } else {
            format!("{pattern} REJECT\n")
        }
    }
}

/// Text contents of the four maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledMaps {
    pub enforce_literal: String,
    pub enforce_pattern: String,
    pub test_literal: String,
    pub test_pattern: String,
    pattern_entries: usize,
    total_entries: usize,
}

impl CompiledMaps {
    pub fn get(&self, kind: MapKind) -> &str {
        match kind {
            MapKind::EnforceLiteral => &self.enforce_literal,
            MapKind::EnforcePattern => &self.enforce_pattern,
            MapKind::TestLiteral => &self.test_literal,
            MapKind::TestPattern => &self.test_pattern,
        }
    }

    fn get_mut(&mut self, kind: MapKind) -> &mut String {
        match kind {
            MapKind::EnforceLiteral => &mut self.enforce_literal,
            MapKind::EnforcePattern => &mut self.enforce_pattern,
            MapKind::TestLiteral => &mut self.test_literal,
            MapKind::TestPattern => &mut self.test_pattern,
        }
    }

    /// Entries that landed in either pattern map.
    pub fn pattern_entries(&self) -> usize {
        self.pattern_entries
    }

    pub fn total_entries(&self) -> usize {
        self.total_entries
    }
}

/// Partitions `entries` into the four maps.
///
/// Each bucket is sorted by pattern, then id, so the output depends only on
/// the set of entries and not on the order the store returned them in.
pub fn compile(entries: &[BlockEntry]) -> CompiledMaps {
    let mut sorted: Vec<&BlockEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.pattern.cmp(&b.pattern).then(a.id.cmp(&b.id)));

    let mut maps = CompiledMaps {
        total_entries: entries.len(),
        ..CompiledMaps::default()
    };
    for entry in sorted {
        let kind = MapKind::of(entry);
        if kind.is_pattern() {
            maps.pattern_entries += 1;
        }
        maps.get_mut(kind).push_str(&kind.render(&entry.pattern));
    }
    maps
}
