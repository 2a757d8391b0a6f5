//! End-to-end pipeline tests: a legacy instruction stream goes through the
//! translator into the ring engine, and a device model drains the ring
//! window and parses what arrived.

use boreal_gpu_protocol::{
    CommandReader, CommandRecord, Opcode, RegisterIndex, RingCaps, DEVICE_ID_MAGIC, INDEX_PORT,
    VALUE_PORT,
};
use boreal_gpu_ring::{PortIo, RingEngine, RingWindow};
use boreal_gpu_translate::{known_programs, Translator};
use pretty_assertions::assert_eq;

/// Device model answering the identity probe and always reporting idle.
struct FakePort {
    index: u32,
}

impl FakePort {
    fn new() -> Self {
        Self { index: 0 }
    }
}

impl PortIo for FakePort {
    fn port_read(&mut self, port: u16) -> u32 {
        assert_eq!(port, VALUE_PORT);
        if self.index == RegisterIndex::Id as u32 {
            DEVICE_ID_MAGIC
        } else {
            0
        }
    }

    fn port_write(&mut self, port: u16, value: u32) {
        if port == INDEX_PORT {
            self.index = value;
        }
    }
}

fn engine(data_bytes: usize, caps: RingCaps) -> RingEngine<FakePort> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let window = RingWindow::new(data_bytes, caps).unwrap();
    RingEngine::new(FakePort::new(), window).unwrap()
}

/// Consume everything published since the last drain, the way the device
/// would: copy `[stop, next_cmd)` (wrapping at `max`) and advance `stop`.
fn drain(engine: &mut RingEngine<FakePort>) -> Vec<u8> {
    let window = engine.window_mut();
    let (min, max) = (window.min(), window.max());
    let (stop, next) = (window.stop(), window.next_cmd());
    let mut out = Vec::new();
    if next >= stop {
        out.extend_from_slice(window.data(stop, next - stop));
    } else {
        out.extend_from_slice(window.data(stop, max - stop));
        out.extend_from_slice(window.data(min, next - min));
    }
    window.set_stop(next);
    out
}

fn parse(bytes: &[u8]) -> Vec<(Opcode, Vec<u8>)> {
    CommandReader::new(bytes)
        .unwrap()
        .map(|r| {
            let CommandRecord { opcode, payload } = r.unwrap();
            (opcode, payload.to_vec())
        })
        .collect()
}

const CLASS_3D: u32 = 3 << 29;

fn extended(sub: u32, payload: &[u32]) -> Vec<u32> {
    let mut words = vec![CLASS_3D | (0x1D << 24) | (sub << 16) | (payload.len() as u32 - 1)];
    words.extend_from_slice(payload);
    words
}

fn load_immediate_words(groups: &[(usize, u32)]) -> Vec<u32> {
    let mut cmd = CLASS_3D | (0x1D << 24) | (0x04 << 16) | (groups.len() as u32 - 1);
    let mut words = vec![0u32];
    for &(group, value) in groups {
        cmd |= 1 << (4 + group);
        words.push(value);
    }
    words[0] = cmd;
    words
}

fn draw_words(kind: u32, payload: &[u32]) -> Vec<u32> {
    let mut words = vec![CLASS_3D | (0x1F << 24) | (kind << 18) | (payload.len() as u32 - 1)];
    words.extend_from_slice(payload);
    words
}

// XYZW position, primary color, one FLOAT4 texcoord set: 36-byte vertices.
const S2_ONE_TC4: u32 = 0xFFFF_FFF2;
const S4_XYZW_COLOR: u32 = (2 << 6) | (1 << 10);

#[test]
fn legacy_frame_reaches_the_device_in_order() {
    let mut ring = engine(4096, RingCaps::RESERVE | RingCaps::FENCE);
    let mut translator = Translator::new();

    let mut stream = Vec::new();
    stream.extend(load_immediate_words(&[
        (2, S2_ONE_TC4),
        (4, S4_XYZW_COLOR),
        (6, 0x0008_8000),
    ]));
    stream.extend(extended(0x81, &[(20 << 16) | 10, (219 << 16) | 109]));
    stream.extend(extended(0x05, known_programs::MODULATE));
    stream.extend([(33 << 23) | 1, 64, 0]); // store a fence in slot 0
    let vertex_words: Vec<u32> = (0..27).collect();
    stream.extend(draw_words(0, &vertex_words));

    let summary = translator.submit(&stream, &mut ring);
    assert_eq!(summary.words_consumed, stream.len());
    assert_eq!(summary.anomalies, 0);
    assert_eq!(summary.commands_rejected, 0);

    let commands = parse(&drain(&mut ring));
    let opcodes: Vec<Opcode> = commands.iter().map(|(op, _)| *op).collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::SetRenderState, // raster group
            Opcode::SetRenderState, // blend group
            Opcode::SetScissorRect,
            Opcode::DefineProgram,
            Opcode::SelectProgram,
            Opcode::Fence,
            Opcode::DrawPrimitive,
        ]
    );

    // The fence id the translator recorded is the one in the stream.
    let fence_id = translator.fence_slot(0).unwrap();
    assert_eq!(fence_id, 1);
    let fence_payload = &commands[5].1;
    assert_eq!(
        u32::from_le_bytes(fence_payload[..4].try_into().unwrap()),
        fence_id
    );

    // The device retires it through the window's fence word.
    assert!(!ring.has_fence_passed(fence_id));
    ring.window_mut().set_fence(fence_id);
    assert!(ring.has_fence_passed(fence_id));
}

#[test]
fn redundant_state_is_suppressed_across_submissions() {
    let mut ring = engine(1024, RingCaps::RESERVE | RingCaps::FENCE);
    let mut translator = Translator::new();

    let words = load_immediate_words(&[(6, 0x0008_8000)]);
    translator.submit(&words, &mut ring);
    assert_eq!(parse(&drain(&mut ring)).len(), 1);

    // The same group value again crosses the ring zero times.
    translator.submit(&words, &mut ring);
    assert!(drain(&mut ring).is_empty());
}

#[test]
fn command_framing_survives_ring_wrap() {
    // Ring far smaller than the total traffic, so commands wrap repeatedly.
    let mut ring = engine(128, RingCaps::RESERVE | RingCaps::FENCE);
    let mut translator = Translator::new();

    let mut total = 0;
    for i in 0..10u32 {
        let words = extended(0x81, &[(i << 16) | i, ((i + 9) << 16) | (i + 9)]);
        translator.submit(&words, &mut ring);
        let commands = parse(&drain(&mut ring));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, Opcode::SetScissorRect);
        assert_eq!(
            u32::from_le_bytes(commands[0].1[..4].try_into().unwrap()),
            i
        );
        total += 1;
    }
    assert_eq!(total, 10);
}

#[test]
fn unfenced_ring_reports_fences_unsupported() {
    let mut ring = engine(1024, RingCaps::RESERVE);
    let mut translator = Translator::new();

    // The store-fence command degrades to the "no fence" id.
    translator.submit(&[(33 << 23) | 1, 64, 3], &mut ring);
    assert_eq!(translator.fence_slot(3), Some(0));
    assert!(drain(&mut ring).is_empty());

    // Id zero is always satisfied.
    assert!(ring.has_fence_passed(0));
}

#[test]
fn teardown_purges_programs_through_the_ring() {
    let mut ring = engine(1024, RingCaps::RESERVE | RingCaps::FENCE);
    let mut translator = Translator::new();

    translator.submit(&extended(0x05, known_programs::PASSTHROUGH), &mut ring);
    drain(&mut ring);

    translator.reset(&mut ring, true);
    let opcodes: Vec<Opcode> = parse(&drain(&mut ring)).iter().map(|(op, _)| *op).collect();
    assert_eq!(opcodes, vec![Opcode::SelectProgram, Opcode::DestroyProgram]);
}
