//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! Set `DEFINITION_INJECTOR_LOG=definition_injector=trace` to see every
//! resolution step.

use definition_injector::prelude::*;

#[allow(dead_code)]
struct Database {
    url: String,
}

#[allow(dead_code)]
struct UserService {
    db: Arc<Database>,
}

fn main() {
    // Uses JSON if logging-json is enabled, pretty otherwise
    definition_injector::logging::init();

    println!("=== Definition Injector Logging Demo ===\n");

    // logs: "Creating definition container"
    let container = Container::new();

    // logs: "Registering definition"
    container
        .register(
            "db",
            Definition::autowire(ClassDescriptor::named::<Database, _>(
                "Database",
                [ParamDescriptor::new("url").builtin("String")],
                |args| Ok(Database { url: args.cloned::<String>(0)? }),
            ))
            .bind("url", ArgumentSpec::value("postgres://localhost/mydb".to_string()))
            .singleton(),
        )
        .unwrap();

    container
        .register(
            "users",
            Definition::autowire(ClassDescriptor::named::<UserService, _>(
                "UserService",
                [ParamDescriptor::new("db").typed("db")],
                |args| Ok(UserService { db: args.get::<Database>(0)? }),
            )),
        )
        .unwrap();

    // Default-valued parameter with nothing registered
    // logs: "No source for parameter, using its default value"
    container
        .register(
            "pool.size",
            Definition::function(FunctionDescriptor::new::<u32, _>(
                "pool_size",
                [ParamDescriptor::new("workers").builtin("u32").default_value(4u32)],
                |args| Ok(args.cloned::<u32>(0)? * 2),
            )),
        )
        .unwrap();

    // logs: "Building service" (trace), then "Service resolved from singleton cache"
    let _users = container.get_as::<UserService>("users").unwrap();
    let _db = container.get_as::<Database>("db").unwrap();
    let _size = container.get_as::<u32>("pool.size").unwrap();

    // logs: "Service not found in container"
    assert!(container.get("missing").is_err());

    // logs: "Compiling container", "Compilation finished"
    let compiled = container.compile_container().unwrap();
    let _users = compiled.get_as::<UserService>("users").unwrap();

    // logs: "Container locked - no further registrations allowed"
    container.lock();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
