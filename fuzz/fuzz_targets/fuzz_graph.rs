#![no_main]

//! Fuzz target for definition graphs
//!
//! Builds random graphs of values, references and autowired nodes (cycles
//! and dangling dependencies included) and checks that whenever the graph
//! compiles, the compiled container agrees with the live one on every id.

use arbitrary::Arbitrary;
use definition_injector::{
    ClassDescriptor, Container, ContainerConfig, Definition, DiError, ParamDescriptor,
};
use libfuzzer_sys::fuzz_target;
use std::mem::discriminant;

const MAX_NODES: usize = 8;

struct Node(u64);

#[derive(Debug, Arbitrary)]
enum NodeKind {
    Value(u32),
    Reference(u8),
    Autowire { deps: Vec<u8>, singleton: bool },
}

#[derive(Debug, Arbitrary)]
struct Graph {
    nodes: Vec<NodeKind>,
    singleton_default: bool,
}

fn id(index: u8) -> String {
    // One past the last node stays dangling
    format!("n{}", index as usize % (MAX_NODES + 1))
}

fn definition(kind: &NodeKind) -> Definition {
    match kind {
        NodeKind::Value(value) => Definition::value(Node(u64::from(*value))),
        NodeKind::Reference(target) => Definition::reference(id(*target)),
        NodeKind::Autowire { deps, singleton } => {
            let params: Vec<ParamDescriptor> = deps
                .iter()
                .take(4)
                .enumerate()
                .map(|(position, target)| ParamDescriptor::new(format!("d{position}")).typed(id(*target)))
                .collect();
            let arity = params.len();
            let class = ClassDescriptor::named::<Node, _>("Node", params, move |args| {
                let mut sum = 1u64;
                for position in 0..arity {
                    sum = sum.wrapping_add(args.get::<Node>(position)?.0);
                }
                Ok(Node(sum))
            });
            Definition::autowire(class).with_singleton(singleton.then_some(true))
        }
    }
}

fn outcome(result: Result<u64, DiError>) -> Result<u64, std::mem::Discriminant<DiError>> {
    result.map_err(|err| discriminant(&err))
}

fuzz_target!(|graph: Graph| {
    let container =
        Container::with_config(ContainerConfig::new().with_singleton_default(graph.singleton_default));
    for (index, kind) in graph.nodes.iter().take(MAX_NODES).enumerate() {
        container.register(format!("n{index}"), definition(kind)).unwrap();
    }

    let ids = container.ids();

    for id in &ids {
        if let Err(err) = container.get(id) {
            if let DiError::CircularReference { chain } = &err {
                assert_eq!(chain.first(), chain.last());
            }
        }
    }

    let Ok(compiled) = container.compile_container() else {
        return;
    };
    assert_eq!(compiled.graph().len(), ids.len());

    for id in &ids {
        let live = outcome(container.get_as::<Node>(id).map(|node| node.0));
        let built = outcome(compiled.get_as::<Node>(id).map(|node| node.0));
        assert_eq!(live, built, "live and compiled disagree on {id}");
    }
});
