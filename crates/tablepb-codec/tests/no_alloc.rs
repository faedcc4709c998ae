use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use tablepb_codec::{decode_from_slice, encode_to_slice, DataKind, FieldDescriptor, MessageDescriptor};

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations_during(f: impl FnOnce()) -> usize {
    let before = ALLOCATIONS.with(Cell::get);
    f();
    ALLOCATIONS.with(Cell::get) - before
}

const READINGS_SIZE: usize = 36;

static READINGS_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::new(1, "varints", DataKind::UINT32, 0, 4).repeated(8, 2).packed(),
    FieldDescriptor::new(2, "fixed", DataKind::FIXED32, 12, 4).repeated(20, 2).packed(),
    FieldDescriptor::new(3, "plain", DataKind::UINT32, 24, 4).repeated(32, 2),
];
static READINGS: MessageDescriptor =
    MessageDescriptor::new("Readings", &READINGS_FIELDS, READINGS_SIZE);

fn put(block: &mut [u8], offset: usize, value: u32) {
    block[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn readings() -> [u8; READINGS_SIZE] {
    let mut block = [0u8; READINGS_SIZE];
    put(&mut block, 0, 1);
    put(&mut block, 4, 300);
    put(&mut block, 8, 2);
    put(&mut block, 12, 7);
    put(&mut block, 16, 9);
    put(&mut block, 20, 2);
    put(&mut block, 24, 5);
    put(&mut block, 32, 1);
    block
}

#[test]
fn packed_and_unpacked_encode_into_a_slice_without_allocating() {
    let block = readings();
    let mut buf = [0u8; 64];
    // First call registers any logging callsites.
    let mut written = encode_to_slice(&mut buf, &READINGS, &block).unwrap();

    let allocations = allocations_during(|| {
        written = encode_to_slice(&mut buf, &READINGS, &block).unwrap();
    });

    assert_eq!(allocations, 0);
    assert_eq!(
        &buf[..written],
        [
            0x0A, 0x03, 0x01, 0xAC, 0x02, // varints: packed [1, 300]
            0x12, 0x08, 7, 0, 0, 0, 9, 0, 0, 0, // fixed: packed [7, 9]
            0x18, 0x05, // plain: [5]
        ]
    );
}

#[test]
fn decoding_into_a_block_does_not_allocate() {
    let block = readings();
    let mut buf = [0u8; 64];
    let written = encode_to_slice(&mut buf, &READINGS, &block).unwrap();
    let mut decoded = [0u8; READINGS_SIZE];
    decode_from_slice(&buf[..written], &READINGS, &mut decoded).unwrap();
    decoded = [0u8; READINGS_SIZE];

    let allocations = allocations_during(|| {
        decode_from_slice(&buf[..written], &READINGS, &mut decoded).unwrap();
    });

    assert_eq!(allocations, 0);
    assert_eq!(decoded, block);
}
