//! Voice pool allocation, stealing, and the note registry.
//!
//! A fixed arena of voices is partitioned into a free-index stack and an
//! oldest-first active list. The (channel, note) registry is a singly
//! linked node arena with its own free-index stack, so layered
//! instruments can hang several voices off one key without allocating on
//! note-on. Everything is sized once at construction.

use crate::voice::{Voice, VoiceState};

/// Policy applied when a note arrives and the free list is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceStealPolicy {
    /// Prefer any released (non-playing) voice, oldest first; otherwise
    /// take the oldest playing voice.
    #[default]
    Oldest,
    /// Among released voices, take the one with the lowest combined mix
    /// volume; if every voice is still playing, fall back to the oldest.
    Quietest,
    /// Drop the new note.
    Skip,
}

const NO_NODE: i32 = -1;
const REGISTRY_BUCKETS: usize = 16 * 128;

#[derive(Clone, Copy, Debug)]
struct RegistryNode {
    voice: usize,
    next: i32,
}

/// Owns the fixed voice pool and the note→voice registry.
#[derive(Debug)]
pub struct VoiceManager {
    voices: Vec<Voice>,
    free: Vec<usize>,
    active: Vec<usize>,
    policy: VoiceStealPolicy,
    heads: Vec<i32>,
    nodes: Vec<RegistryNode>,
    free_nodes: Vec<usize>,
    age_counter: u64,
}

impl VoiceManager {
    /// Allocate a pool of `polyphony` voices. This is the only place the
    /// voice subsystem allocates.
    pub fn new(polyphony: usize) -> Self {
        assert!(polyphony > 0, "polyphony must be at least 1");
        Self {
            voices: (0..polyphony).map(|_| Voice::new()).collect(),
            // Popping from the stack hands out low indices first.
            free: (0..polyphony).rev().collect(),
            active: Vec::with_capacity(polyphony),
            policy: VoiceStealPolicy::default(),
            heads: vec![NO_NODE; REGISTRY_BUCKETS],
            nodes: vec![
                RegistryNode {
                    voice: 0,
                    next: NO_NODE
                };
                polyphony
            ],
            free_nodes: (0..polyphony).collect(),
            age_counter: 0,
        }
    }

    /// Pool size.
    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices currently sounding.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of voices available without stealing.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Configured stealing policy.
    pub fn steal_policy(&self) -> VoiceStealPolicy {
        self.policy
    }

    /// Set the stealing policy.
    pub fn set_steal_policy(&mut self, policy: VoiceStealPolicy) {
        self.policy = policy;
    }

    /// Active voice indices, oldest first.
    pub fn active_indices(&self) -> &[usize] {
        &self.active
    }

    /// Shared access to one voice slot.
    pub fn voice(&self, index: usize) -> &Voice {
        &self.voices[index]
    }

    /// Exclusive access to one voice slot.
    pub fn voice_mut(&mut self, index: usize) -> &mut Voice {
        &mut self.voices[index]
    }

    /// Hand out a voice for a new note.
    ///
    /// Pops the free list when possible; otherwise applies the stealing
    /// policy. A stolen voice is force-removed from the active list and
    /// the registry before being returned. Returns `None` only under the
    /// `Skip` policy (the note is dropped).
    pub fn get_free_voice(&mut self) -> Option<usize> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        let victim = match self.policy {
            VoiceStealPolicy::Oldest => self.oldest_victim(),
            VoiceStealPolicy::Quietest => self.quietest_victim(),
            VoiceStealPolicy::Skip => return None,
        }?;
        self.steal(victim);
        Some(victim)
    }

    /// Activate a configured voice: stamp its age, append it to the
    /// active list, and register it under its (channel, note) key.
    pub fn activate(&mut self, index: usize) {
        self.age_counter += 1;
        self.voices[index].params.age = self.age_counter;
        self.active.push(index);
        let channel = self.voices[index].params.channel;
        let note = self.voices[index].params.note;
        self.registry_add(channel, note, index);
    }

    /// Return a voice obtained from [`Self::get_free_voice`] that was
    /// never activated (its patch refused to start).
    pub fn release_unstarted(&mut self, index: usize) {
        self.free.push(index);
    }

    /// Remove every voice whose patch marked it stopped during the last
    /// block, returning each to the free list.
    pub fn retire_finished(&mut self) {
        let mut position = 0;
        while position < self.active.len() {
            let index = self.active[position];
            if self.voices[index].params.state == VoiceState::Stopped {
                self.active.remove(position);
                self.registry_remove(index);
                self.free.push(index);
            } else {
                position += 1;
            }
        }
    }

    /// Run `action` on every registered voice for a (channel, note) key.
    pub fn for_each_note_voice(
        &mut self,
        channel: u8,
        note: u8,
        mut action: impl FnMut(&mut Voice),
    ) {
        let mut node = self.heads[Self::bucket(channel, note)];
        while node != NO_NODE {
            let entry = self.nodes[node as usize];
            action(&mut self.voices[entry.voice]);
            node = entry.next;
        }
    }

    /// Release every active voice sharing a non-zero exclusive group.
    pub fn stop_exclusive_group(&mut self, group: u32) {
        debug_assert_ne!(group, 0);
        for &index in &self.active {
            let voice = &mut self.voices[index];
            if voice.params.exclusive_group == group {
                voice.stop();
            }
        }
    }

    /// Stop every active voice: gracefully, or immediately (no release
    /// envelopes) for panic/reset.
    pub fn stop_all(&mut self, immediate: bool) {
        for &index in &self.active {
            let voice = &mut self.voices[index];
            if immediate {
                voice.kill();
            } else {
                voice.stop();
            }
        }
        if immediate {
            self.retire_finished();
        }
    }

    /// Stop every active voice on one channel (CC 120/123 semantics).
    pub fn stop_channel(&mut self, channel: u8, immediate: bool) {
        for &index in &self.active {
            let voice = &mut self.voices[index];
            if voice.params.channel != channel {
                continue;
            }
            if immediate {
                voice.kill();
            } else {
                voice.stop();
            }
        }
        if immediate {
            self.retire_finished();
        }
    }

    /// Apply note-offs deferred by the hold pedal on one channel.
    pub fn release_pending(&mut self, channel: u8) {
        for &index in &self.active {
            let voice = &mut self.voices[index];
            if voice.params.channel == channel && voice.params.note_off_pending {
                voice.params.note_off_pending = false;
                voice.stop();
            }
        }
    }

    fn oldest_victim(&self) -> Option<usize> {
        self.active
            .iter()
            .copied()
            .find(|&index| self.voices[index].params.state != VoiceState::Playing)
            .or_else(|| self.active.first().copied())
    }

    fn quietest_victim(&self) -> Option<usize> {
        self.active
            .iter()
            .copied()
            .filter(|&index| self.voices[index].params.state != VoiceState::Playing)
            .min_by(|&a, &b| {
                self.voices[a]
                    .params
                    .combined_gain()
                    .total_cmp(&self.voices[b].params.combined_gain())
            })
            .or_else(|| self.active.first().copied())
    }

    fn steal(&mut self, index: usize) {
        if let Some(position) = self.active.iter().position(|&i| i == index) {
            self.active.remove(position);
        }
        self.registry_remove(index);
        self.voices[index].kill();
    }

    #[inline]
    fn bucket(channel: u8, note: u8) -> usize {
        usize::from(channel & 0x0F) * 128 + usize::from(note & 0x7F)
    }

    fn registry_add(&mut self, channel: u8, note: u8, voice: usize) {
        // One node per voice slot exists, so the free-node stack cannot
        // run dry while the registry invariant holds.
        let node = self
            .free_nodes
            .pop()
            .expect("registry node arena exhausted");
        let bucket = Self::bucket(channel, note);
        self.nodes[node] = RegistryNode {
            voice,
            next: self.heads[bucket],
        };
        self.heads[bucket] = node as i32;
    }

    fn registry_remove(&mut self, voice: usize) {
        let channel = self.voices[voice].params.channel;
        let note = self.voices[voice].params.note;
        let bucket = Self::bucket(channel, note);

        let mut previous = NO_NODE;
        let mut node = self.heads[bucket];
        while node != NO_NODE {
            let entry = self.nodes[node as usize];
            if entry.voice == voice {
                if previous == NO_NODE {
                    self.heads[bucket] = entry.next;
                } else {
                    self.nodes[previous as usize].next = entry.next;
                }
                self.free_nodes.push(node as usize);
                return;
            }
            previous = node;
            node = entry.next;
        }
    }

    /// Registered voice indices for a key. Test/telemetry helper; the
    /// render path walks the node chain directly.
    pub fn registered_voices(&self, channel: u8, note: u8) -> Vec<usize> {
        let mut result = Vec::new();
        let mut node = self.heads[Self::bucket(channel, note)];
        while node != NO_NODE {
            let entry = self.nodes[node as usize];
            result.push(entry.voice);
            node = entry.next;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activate_note(manager: &mut VoiceManager, channel: u8, note: u8) -> usize {
        let index = manager.get_free_voice().expect("voice available");
        manager.voices[index].params.configure(channel, note, 100);
        manager.voices[index].params.state = VoiceState::Playing;
        manager.activate(index);
        index
    }

    #[test]
    fn pool_hands_out_each_voice_once() {
        let mut manager = VoiceManager::new(4);
        let mut seen = Vec::new();
        for note in 0..4 {
            let index = activate_note(&mut manager, 0, note);
            assert!(!seen.contains(&index));
            seen.push(index);
        }
        assert_eq!(manager.active_count(), 4);
        assert_eq!(manager.free_count(), 0);
    }

    #[test]
    fn active_count_never_exceeds_polyphony() {
        let mut manager = VoiceManager::new(3);
        for note in 0..10 {
            activate_note(&mut manager, 0, note);
            assert!(manager.active_count() <= 3);
        }
    }

    #[test]
    fn oldest_policy_steals_first_started() {
        let mut manager = VoiceManager::new(2);
        let a = activate_note(&mut manager, 0, 60);
        let b = activate_note(&mut manager, 0, 64);

        // Pool exhausted: the next note must steal voice A (the oldest),
        // leaving B untouched and A unregistered.
        let c = manager.get_free_voice().unwrap();
        assert_eq!(c, a);
        assert_eq!(manager.voice(a).params.state, VoiceState::Stopped);
        assert!(manager.registered_voices(0, 60).is_empty());
        assert_eq!(manager.registered_voices(0, 64), vec![b]);

        manager.voices[c].params.configure(0, 67, 100);
        manager.voices[c].params.state = VoiceState::Playing;
        manager.activate(c);
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn oldest_policy_prefers_released_voices() {
        let mut manager = VoiceManager::new(3);
        let a = activate_note(&mut manager, 0, 60);
        let b = activate_note(&mut manager, 0, 64);
        let _c = activate_note(&mut manager, 0, 67);

        // B is releasing; it must be chosen over the older but still
        // playing A.
        manager.voices[b].params.state = VoiceState::Stopping;
        let stolen = manager.get_free_voice().unwrap();
        assert_eq!(stolen, b);
        assert_eq!(manager.voice(a).params.state, VoiceState::Playing);
    }

    #[test]
    fn quietest_policy_picks_lowest_gain() {
        let mut manager = VoiceManager::new(3);
        let a = activate_note(&mut manager, 0, 60);
        let b = activate_note(&mut manager, 0, 64);
        let c = activate_note(&mut manager, 0, 67);
        manager.set_steal_policy(VoiceStealPolicy::Quietest);

        for (index, gain) in [(a, 0.5), (b, 0.05), (c, 0.3)] {
            manager.voices[index].params.state = VoiceState::Stopping;
            manager.voices[index].params.gain_left = gain;
            manager.voices[index].params.gain_right = gain;
        }
        let stolen = manager.get_free_voice().unwrap();
        assert_eq!(stolen, b, "quietest releasing voice should be stolen");
    }

    #[test]
    fn quietest_policy_falls_back_to_oldest() {
        let mut manager = VoiceManager::new(2);
        let a = activate_note(&mut manager, 0, 60);
        let _b = activate_note(&mut manager, 0, 64);
        manager.set_steal_policy(VoiceStealPolicy::Quietest);

        let stolen = manager.get_free_voice().unwrap();
        assert_eq!(stolen, a, "all playing: oldest wins");
    }

    #[test]
    fn skip_policy_drops_notes() {
        let mut manager = VoiceManager::new(1);
        activate_note(&mut manager, 0, 60);
        manager.set_steal_policy(VoiceStealPolicy::Skip);
        assert!(manager.get_free_voice().is_none());
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn registry_supports_layered_voices_per_key() {
        let mut manager = VoiceManager::new(4);
        let a = activate_note(&mut manager, 0, 60);
        let b = activate_note(&mut manager, 0, 60);
        let mut registered = manager.registered_voices(0, 60);
        registered.sort_unstable();
        assert_eq!(registered, vec![a.min(b), a.max(b)]);

        let mut touched = 0;
        manager.for_each_note_voice(0, 60, |_| touched += 1);
        assert_eq!(touched, 2);
    }

    #[test]
    fn registry_matches_active_list() {
        let mut manager = VoiceManager::new(4);
        for note in [60, 60, 64, 67] {
            activate_note(&mut manager, 0, note);
        }

        // Every registered voice is active.
        for note in [60, 64, 67] {
            for index in manager.registered_voices(0, note) {
                assert!(manager.active_indices().contains(&index));
            }
        }

        // Retiring removes from both sides.
        let stopped = manager.registered_voices(0, 60)[0];
        manager.voices[stopped].kill();
        manager.retire_finished();
        assert!(!manager.active_indices().contains(&stopped));
        assert!(!manager.registered_voices(0, 60).contains(&stopped));
        assert_eq!(manager.registered_voices(0, 60).len(), 1);
    }

    #[test]
    fn stop_all_immediate_empties_pool() {
        let mut manager = VoiceManager::new(4);
        for note in 0..4 {
            activate_note(&mut manager, 0, note);
        }
        manager.stop_all(true);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.free_count(), 4);
        for note in 0..4 {
            assert!(manager.registered_voices(0, note).is_empty());
        }
    }

    #[test]
    fn release_unstarted_returns_to_free_list() {
        let mut manager = VoiceManager::new(2);
        let index = manager.get_free_voice().unwrap();
        manager.release_unstarted(index);
        assert_eq!(manager.free_count(), 2);
        assert_eq!(manager.active_count(), 0);
    }
}
