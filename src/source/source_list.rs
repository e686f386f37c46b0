// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The session's source catalog.

use indexmap::IndexMap;

use crate::error::ConfigurationError;
use crate::source::Source;

/// All sources of a session. Sources are addressed by index everywhere in
/// the core; the name map only serves lookups at the configuration
/// boundary.
#[derive(Clone, Debug, Default)]
pub struct SourceList {
    sources: Vec<Source>,
    name_to_idx: IndexMap<String, usize>,
}

impl SourceList {
    pub fn new() -> SourceList {
        SourceList::default()
    }

    /// Add a source and return its index.
    pub fn push(&mut self, source: Source) -> usize {
        let idx = self.sources.len();
        self.name_to_idx.insert(source.name().to_string(), idx);
        if let Some(alias) = source.alias() {
            self.name_to_idx.insert(alias.to_string(), idx);
        }
        self.sources.push(source);
        idx
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Source {
        &self.sources[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Source {
        &mut self.sources[idx]
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Source> {
        self.name_to_idx.get(name).map(|&idx| &self.sources[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source> {
        self.sources.iter_mut()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sources.is_empty() {
            return Err(ConfigurationError::NoSources);
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for SourceList {
    type Output = Source;

    fn index(&self, idx: usize) -> &Source {
        &self.sources[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::RADec;
    use crate::source::SourceBody;
    use std::collections::BTreeMap;

    #[test]
    fn lookup_by_name_and_alias() {
        let mut list = SourceList::new();
        let src = Source::new(
            "0212+735",
            SourceBody::Quasar(RADec::new_degrees(33.0, 73.0)),
            BTreeMap::new(),
        )
        .with_alias("J0217+7349");
        let idx = list.push(src);

        assert_eq!(list.index_of("0212+735"), Some(idx));
        assert_eq!(list.index_of("J0217+7349"), Some(idx));
        assert!(list.index_of("nope").is_none());
    }

    #[test]
    fn empty_list_fails_validation() {
        assert!(SourceList::new().validate().is_err());
    }
}
