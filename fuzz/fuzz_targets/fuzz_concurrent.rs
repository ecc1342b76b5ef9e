#![no_main]

//! Fuzz target for concurrent resolution
//!
//! Several threads race on the first resolution of a chain of singletons;
//! every singleton must be built exactly once and shared by all threads.

use arbitrary::Arbitrary;
use definition_injector::{Arc, ClassDescriptor, Container, Definition, ParamDescriptor};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

struct Link;

/// Concurrent test scenario
#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Chain length (clamped to 1-8)
    depth: u8,
    // Number of threads (clamped to 1-8)
    thread_count: u8,
    // Which chain element each thread asks for first
    entry_points: Vec<u8>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let depth = (scenario.depth % 8).max(1) as usize;
    let thread_count = (scenario.thread_count % 8).max(1) as usize;

    let builds = Arc::new(AtomicUsize::new(0));
    let container = Container::new();

    for level in 0..depth {
        let params = if level == 0 {
            Vec::new()
        } else {
            vec![ParamDescriptor::new("next").typed(format!("link.{}", level - 1))]
        };
        let builds = Arc::clone(&builds);
        let class = ClassDescriptor::named::<Link, _>("Link", params, move |_| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Link)
        });
        container
            .register(format!("link.{level}"), Definition::autowire(class).singleton())
            .unwrap();
    }

    let resolved: Vec<Vec<_>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..thread_count)
            .map(|thread| {
                let first = scenario
                    .entry_points
                    .get(thread)
                    .map_or(0, |entry| *entry as usize % depth);
                let container = &container;
                scope.spawn(move || {
                    let mut values = Vec::with_capacity(depth);
                    let _ = container.get(&format!("link.{first}")).unwrap();
                    for level in 0..depth {
                        values.push(container.get(&format!("link.{level}")).unwrap());
                    }
                    values
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(builds.load(Ordering::SeqCst), depth);
    for values in &resolved[1..] {
        for (a, b) in values.iter().zip(&resolved[0]) {
            assert!(Arc::ptr_eq(a, b));
        }
    }
});
