//! Content-addressed program cache.
//!
//! Shader content arriving in the instruction stream is identified by its
//! BLAKE3 hash. The cache keeps every hash it has ever seen in an
//! arena-backed move-to-front list (a hash map gives O(1) lookup, intrusive
//! prev/next links give O(1) promotion). Only content matching the built-in
//! table ever resolves to a device program; everything else stays pinned to
//! the unresolved sentinel — this layer does no program compilation.

use std::collections::HashMap;
use std::sync::OnceLock;

use boreal_gpu_protocol::{
    CommandSink, CommandWriter, Opcode, ProgramKind, PROGRAM_ID_INVALID,
};
use tracing::{debug, warn};

const NONE: usize = usize::MAX;

/// A recognized fixed-function program: the legacy source words clients send
/// and the device bytecode defined in their place.
struct BuiltinProgram {
    name: &'static str,
    kind: ProgramKind,
    source: &'static [u32],
    bytecode: &'static [u32],
}

// Legacy pixel programs the fixed-function client is known to emit, three
// words per instruction. The replacement bytecode is the device's native
// encoding of the same computation.
const BUILTIN_MODULATE: BuiltinProgram = BuiltinProgram {
    name: "tex0-modulate-diffuse",
    kind: ProgramKind::Pixel,
    source: &[
        0x1940_0000, 0x0000_0123, 0x0000_0000, // dcl t0
        0x1580_0000, 0x0260_0000, 0x0000_0000, // tex r0, t0, s0
        0x0140_0000, 0x0001_0123, 0x0290_0000, // mul oC, r0, v0
    ],
    bytecode: &[0xB000_0001, 0x0000_0003, 0x2000_0100, 0x2100_0201, 0x3F00_0000],
};

const BUILTIN_PASSTHROUGH: BuiltinProgram = BuiltinProgram {
    name: "diffuse-passthrough",
    kind: ProgramKind::Pixel,
    source: &[
        0x1940_0000, 0x0000_0123, 0x0000_0001, // dcl v0
        0x0040_0000, 0x0001_0123, 0x0000_0000, // mov oC, v0
    ],
    bytecode: &[0xB000_0001, 0x0000_0002, 0x2200_0001, 0x3F00_0000],
};

const BUILTIN_SPECULAR_ADD: BuiltinProgram = BuiltinProgram {
    name: "tex0-modulate-add-specular",
    kind: ProgramKind::Pixel,
    source: &[
        0x1940_0000, 0x0000_0123, 0x0000_0000, // dcl t0
        0x1580_0000, 0x0260_0000, 0x0000_0000, // tex r0, t0, s0
        0x0140_0000, 0x0001_0123, 0x0290_0000, // mul r0, r0, v0
        0x00C0_0000, 0x0001_0123, 0x02A0_0001, // add oC, r0, v1
    ],
    bytecode: &[0xB000_0001, 0x0000_0004, 0x2000_0100, 0x2100_0201, 0x2300_0102, 0x3F00_0000],
};

const BUILTINS: [&BuiltinProgram; 3] =
    [&BUILTIN_MODULATE, &BUILTIN_PASSTHROUGH, &BUILTIN_SPECULAR_ADD];

fn builtin_hashes() -> &'static [(blake3::Hash, &'static BuiltinProgram)] {
    static HASHES: OnceLock<Vec<(blake3::Hash, &'static BuiltinProgram)>> = OnceLock::new();
    HASHES.get_or_init(|| {
        BUILTINS
            .iter()
            .map(|b| (blake3::hash(bytemuck::cast_slice(b.source)), *b))
            .collect()
    })
}

#[derive(Debug)]
struct Entry {
    hash: blake3::Hash,
    kind: ProgramKind,
    id: u32,
    prev: usize,
    next: usize,
}

#[derive(Debug, Default)]
pub struct ProgramCache {
    entries: Vec<Entry>,
    by_hash: HashMap<blake3::Hash, usize>,
    head: usize,
    tail: usize,
    next_id: u32,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_hash: HashMap::new(),
            head: NONE,
            tail: NONE,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve shader content to a device program id, defining a built-in on
    /// first sighting. Unrecognized content is remembered as unresolved and
    /// returns [`PROGRAM_ID_INVALID`] without re-hashing the built-in table
    /// on later sightings.
    pub fn resolve(&mut self, words: &[u32], sink: &mut dyn CommandSink) -> u32 {
        if words.is_empty() {
            return PROGRAM_ID_INVALID;
        }
        let hash = blake3::hash(bytemuck::cast_slice(words));
        if let Some(&slot) = self.by_hash.get(&hash) {
            self.promote(slot);
            return self.entries[slot].id;
        }

        let mut id = PROGRAM_ID_INVALID;
        let mut kind = ProgramKind::Pixel;
        if let Some((_, builtin)) = builtin_hashes().iter().find(|(h, _)| *h == hash) {
            id = self.next_id;
            self.next_id += 1;
            kind = builtin.kind;
            debug!(name = builtin.name, id, "defining built-in program");
            let mut w = CommandWriter::new();
            w.begin(Opcode::DefineProgram).write_u32(id).write_u32(kind as u32);
            for &token in builtin.bytecode {
                w.write_u32(token);
            }
            w.end();
            if let Err(err) = sink.submit(&w.finish()) {
                warn!(%err, id, "program define rejected");
            }
        } else {
            debug!(words = words.len(), "unrecognized program content");
        }

        let slot = self.entries.len();
        self.entries.push(Entry {
            hash,
            kind,
            id,
            prev: NONE,
            next: self.head,
        });
        if self.head != NONE {
            self.entries[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NONE {
            self.tail = slot;
        }
        self.by_hash.insert(hash, slot);
        id
    }

    /// Deselect and destroy every resolved program, then forget everything.
    /// `context_alive` is false during forced teardown, when the device
    /// context is already gone and only local state needs freeing.
    pub fn purge(&mut self, sink: &mut dyn CommandSink, context_alive: bool) {
        if context_alive {
            let mut w = CommandWriter::new();
            w.begin(Opcode::SelectProgram)
                .write_u32(PROGRAM_ID_INVALID)
                .end();
            let mut slot = self.head;
            while slot != NONE {
                let entry = &self.entries[slot];
                if entry.id != PROGRAM_ID_INVALID {
                    w.begin(Opcode::DestroyProgram)
                        .write_u32(entry.id)
                        .write_u32(entry.kind as u32)
                        .end();
                }
                slot = entry.next;
            }
            if let Err(err) = sink.submit(&w.finish()) {
                warn!(%err, "program purge rejected");
            }
        }
        self.entries.clear();
        self.by_hash.clear();
        self.head = NONE;
        self.tail = NONE;
        self.next_id = 0;
    }

    fn promote(&mut self, slot: usize) {
        if slot == self.head {
            return;
        }
        let (prev, next) = (self.entries[slot].prev, self.entries[slot].next);
        if prev != NONE {
            self.entries[prev].next = next;
        }
        if next != NONE {
            self.entries[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.entries[slot].prev = NONE;
        self.entries[slot].next = self.head;
        if self.head != NONE {
            self.entries[self.head].prev = slot;
        }
        self.head = slot;
    }
}

/// Source words of the built-in programs, exposed so tests and device models
/// can play back recognizable content.
pub mod known_programs {
    pub const MODULATE: &[u32] = super::BUILTIN_MODULATE.source;
    pub const PASSTHROUGH: &[u32] = super::BUILTIN_PASSTHROUGH.source;
    pub const SPECULAR_ADD: &[u32] = super::BUILTIN_SPECULAR_ADD.source;
}

#[cfg(test)]
mod tests {
    use super::*;
    use boreal_gpu_protocol::{CommandReader, SubmitError};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingSink {
        bytes: Vec<u8>,
    }

    impl RecordingSink {
        fn opcodes(&self) -> Vec<Opcode> {
            CommandReader::new(&self.bytes)
                .unwrap()
                .map(|r| r.unwrap().opcode)
                .collect()
        }
    }

    impl CommandSink for RecordingSink {
        fn submit(&mut self, encoded: &[u8]) -> Result<(), SubmitError> {
            self.bytes.extend_from_slice(encoded);
            Ok(())
        }

        fn insert_fence(&mut self) -> Result<u32, SubmitError> {
            Ok(0)
        }
    }

    #[test]
    fn builtin_defines_once_and_resolves_stably() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();

        let a = cache.resolve(known_programs::MODULATE, &mut sink);
        let b = cache.resolve(known_programs::MODULATE, &mut sink);
        assert_ne!(a, PROGRAM_ID_INVALID);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert_eq!(sink.opcodes(), vec![Opcode::DefineProgram]);
    }

    #[test]
    fn unknown_content_stays_unresolved() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        let id = cache.resolve(&[0xDEAD, 0xBEEF, 0xF00D], &mut sink);
        assert_eq!(id, PROGRAM_ID_INVALID);
        assert_eq!(cache.resolve(&[0xDEAD, 0xBEEF, 0xF00D], &mut sink), id);
        assert_eq!(cache.len(), 1);
        assert!(sink.opcodes().is_empty());
    }

    #[test]
    fn empty_content_is_not_cached() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        assert_eq!(cache.resolve(&[], &mut sink), PROGRAM_ID_INVALID);
        assert!(cache.is_empty());
    }

    #[test]
    fn reuse_promotes_to_front() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        cache.resolve(known_programs::MODULATE, &mut sink); // slot 0
        cache.resolve(known_programs::PASSTHROUGH, &mut sink); // slot 1, front
        assert_eq!(cache.head, 1);

        cache.resolve(known_programs::MODULATE, &mut sink);
        assert_eq!(cache.head, 0);
        assert_eq!(cache.tail, 1);
        assert_eq!(cache.entries[0].next, 1);
        assert_eq!(cache.entries[1].prev, 0);
    }

    #[test]
    fn distinct_content_gets_distinct_ids() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        let a = cache.resolve(known_programs::MODULATE, &mut sink);
        let b = cache.resolve(known_programs::SPECULAR_ADD, &mut sink);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn purge_deselects_destroys_and_resets_ids() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        let first = cache.resolve(known_programs::MODULATE, &mut sink);
        cache.resolve(&[0x1234], &mut sink); // unresolved, no destroy expected
        sink.bytes.clear();

        cache.purge(&mut sink, true);
        assert!(cache.is_empty());
        assert_eq!(
            sink.opcodes(),
            vec![Opcode::SelectProgram, Opcode::DestroyProgram]
        );

        // The id allocator restarts.
        let again = cache.resolve(known_programs::MODULATE, &mut sink);
        assert_eq!(again, first);
    }

    #[test]
    fn dead_context_purge_is_silent() {
        let mut cache = ProgramCache::new();
        let mut sink = RecordingSink::default();
        cache.resolve(known_programs::MODULATE, &mut sink);
        sink.bytes.clear();
        cache.purge(&mut sink, false);
        assert!(cache.is_empty());
        assert!(sink.bytes.is_empty());
    }
}
