//! Verifies the allocation-free claim on the callback lookup path: decoding
//! a record into a caller's `state` through a `fn`-pointer [`Callback`] tree
//! must not touch the global allocator.
//!
//! This needs its own global allocator, so it lives in its own test binary
//! rather than alongside `lookup.rs`.

mod support;

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use mmdb::callback::ObjectBuilder;
use mmdb::Reader;

struct CountingAlloc;

static ALLOC_COUNT: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOCATOR: CountingAlloc = CountingAlloc;

#[test]
fn lookup_with_fn_pointer_callback_does_not_allocate() {
    let reader = Reader::open_bytes(support::minimal_database()).unwrap();

    // fixed-capacity state: no String/Vec growth to confuse the count.
    struct Found {
        city: [u8; 16],
        city_len: usize,
    }

    let callback = ObjectBuilder::<Found>::new()
        .text("city", |s: &mut Found, v| {
            let n = v.len().min(s.city.len());
            s.city[..n].copy_from_slice(&v.as_bytes()[..n]);
            s.city_len = n;
        })
        .build_record();

    let mut found = Found {
        city: [0; 16],
        city_len: 0,
    };

    // warm up: the first lookup may still trigger lazy one-time setup
    // (e.g. the mmap/Vec backing the reader was already allocated above).
    reader
        .lookup("1.2.3.4".parse().unwrap(), &callback, &mut found)
        .unwrap();

    let before = ALLOC_COUNT.load(Ordering::Relaxed);
    reader
        .lookup("5.6.7.8".parse().unwrap(), &callback, &mut found)
        .unwrap();
    let after = ALLOC_COUNT.load(Ordering::Relaxed);

    assert_eq!(&found.city[..found.city_len], b"Testville");
    assert_eq!(before, after, "lookup allocated {} time(s)", after - before);
}
