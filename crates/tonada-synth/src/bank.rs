//! (bank, program) → patch lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::patch::Patch;

/// Bank number the percussion channel is forced onto.
pub const DRUM_BANK: u16 = 128;

/// Program-change target table populated by external bank loaders.
#[derive(Clone, Debug, Default)]
pub struct PatchBank {
    patches: BTreeMap<(u16, u8), Arc<Patch>>,
}

impl PatchBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a patch at (bank, program), replacing any previous one.
    pub fn set(&mut self, bank: u16, program: u8, patch: Arc<Patch>) {
        tracing::debug!(bank, program, patch = patch.name(), "bank slot assigned");
        self.patches.insert((bank, program), patch);
    }

    /// Patch at (bank, program), falling back to bank 0 for melodic
    /// banks the way GM players do.
    pub fn get(&self, bank: u16, program: u8) -> Option<&Arc<Patch>> {
        self.patches.get(&(bank, program)).or_else(|| {
            if bank != 0 && bank != DRUM_BANK {
                self.patches.get(&(0, program))
            } else {
                None
            }
        })
    }

    /// Number of installed patches.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// True when no patches are installed.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DescriptorList, GeneratorDescriptor};
    use crate::patch::SinglePatch;
    use crate::sample::SampleStore;
    use tonada_core::Waveform;

    fn patch(name: &str) -> Arc<Patch> {
        let descriptors = DescriptorList {
            generators: vec![GeneratorDescriptor::waveform(Waveform::Sine)],
            ..DescriptorList::default()
        };
        Arc::new(Patch::Single(
            SinglePatch::load(name, &descriptors, &SampleStore::new()).unwrap(),
        ))
    }

    #[test]
    fn lookup_falls_back_to_bank_zero() {
        let mut bank = PatchBank::new();
        bank.set(0, 5, patch("piano"));
        assert_eq!(bank.get(0, 5).unwrap().name(), "piano");
        // Variation bank without an entry falls back to bank 0.
        assert_eq!(bank.get(8, 5).unwrap().name(), "piano");
        assert!(bank.get(0, 6).is_none());
    }

    #[test]
    fn drum_bank_does_not_fall_back() {
        let mut bank = PatchBank::new();
        bank.set(0, 0, patch("piano"));
        assert!(
            bank.get(DRUM_BANK, 0).is_none(),
            "percussion must not fall back to melodic patches"
        );
        bank.set(DRUM_BANK, 0, patch("kit"));
        assert_eq!(bank.get(DRUM_BANK, 0).unwrap().name(), "kit");
    }
}
