//! Compile a container and print the generated accessor listing
//!
//! ```bash
//! cargo run --example compile
//! ```

use definition_injector::compiler::render;
use definition_injector::prelude::*;

#[allow(dead_code)]
struct Config {
    dsn: String,
}

#[allow(dead_code)]
struct Mailer {
    config: Arc<Config>,
    transports: Vec<String>,
    sender: String,
}

fn main() -> Result<()> {
    let config = ClassDescriptor::named::<Config, _>(
        "Config",
        [ParamDescriptor::new("dsn").builtin("String")],
        |args| Ok(Config { dsn: args.cloned::<String>(0)? }),
    );

    let mailer = ClassDescriptor::named::<Mailer, _>(
        "Mailer",
        [
            ParamDescriptor::new("config").typed("app.config"),
            ParamDescriptor::new("transports").attribute(ParamAttribute::TaggedAs(TagQuery::new("transport").eager())),
        ],
        |args| {
            Ok(Mailer {
                config: args.get::<Config>(0)?,
                transports: args
                    .get::<TaggedValues>(1)?
                    .values_as::<String>()?
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
                sender: String::new(),
            })
        },
    )
    .mutator::<Mailer, _>("set_sender", [ParamDescriptor::new("sender").builtin("String")], |mailer, args| {
        mailer.sender = args.cloned::<String>(0)?;
        Ok(())
    });

    let container = Container::builder()
        .add(
            "app.config",
            Definition::autowire(config)
                .bind("dsn", ArgumentSpec::value("smtp://localhost".to_string()))
                .singleton(),
        )
        .add(
            "mailer",
            Definition::autowire(mailer)
                .setup("set_sender", args!["sender" => ArgumentSpec::value("noreply@example.com".to_string())])
                .singleton(),
        )
        .add("transport.smtp", Definition::value("smtp".to_string()).tag_with("transport", TagSpec::priority(10)))
        .add("transport.log", Definition::value("log".to_string()).tag("transport"))
        .add("mailer.default", Definition::reference("mailer"))
        .add("mailer.lazy", Definition::proxy("mailer"))
        .build()?;

    let graph = container.compile()?;
    println!("{}", render(&graph));

    let compiled = CompiledContainer::new(graph);
    let mailer = compiled.get_as::<Mailer>("mailer.default")?;
    println!("sender: {}, transports: {:?}", mailer.sender, mailer.transports);

    Ok(())
}
