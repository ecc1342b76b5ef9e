#![no_main]

//! Fuzz target for tag collections
//!
//! Registers members with arbitrary priorities and checks that eager and
//! lazy collections, live and compiled, list them in the same order: by
//! descending priority, ties in registration order, unprioritized last.

use arbitrary::Arbitrary;
use definition_injector::{
    Container, Definition, LazyTagged, TagQuery, TagSpec, TaggedValues,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Member {
    priority: Option<i8>,
    tagged: bool,
}

fuzz_target!(|members: Vec<Member>| {
    let container = Container::new();
    let mut expected: Vec<(Option<i64>, usize)> = Vec::new();

    for (index, member) in members.iter().take(32).enumerate() {
        let definition = Definition::value(index);
        let definition = match (member.tagged, member.priority) {
            (false, _) => definition,
            (true, Some(priority)) => definition.tag_with("t", TagSpec::priority(i64::from(priority))),
            (true, None) => definition.tag("t"),
        };
        if member.tagged {
            expected.push((member.priority.map(i64::from), index));
        }
        container.register(format!("m{index}"), definition).unwrap();
    }
    container.register("lazy", Definition::tagged(TagQuery::new("t"))).unwrap();
    container.register("eager", Definition::tagged(TagQuery::new("t").eager())).unwrap();

    expected.sort_by(|a, b| b.0.cmp(&a.0));
    let expected: Vec<String> = expected.into_iter().map(|(_, index)| format!("m{index}")).collect();

    let eager = container.get_as::<TaggedValues>("eager").unwrap();
    assert_eq!(eager.keys().collect::<Vec<_>>(), expected);

    let lazy = container.get_as::<LazyTagged>("lazy").unwrap();
    assert_eq!(lazy.keys().collect::<Vec<_>>(), expected);
    for entry in lazy.iter() {
        let (key, value) = entry.unwrap();
        let index = value.downcast_ref::<usize>().copied().unwrap();
        assert_eq!(key, format!("m{index}"));
    }

    let compiled = container.compile_container().unwrap();
    let eager = compiled.get_as::<TaggedValues>("eager").unwrap();
    assert_eq!(eager.keys().collect::<Vec<_>>(), expected);
});
