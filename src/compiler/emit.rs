//! Human-readable listing of a compiled graph
//!
//! The listing mirrors what a generated container would look like: one
//! accessor per entry, local slots for constructed objects, and direct
//! calls between accessors. It is meant for inspection and snapshot tests,
//! not for feeding back into a compiler.

use super::ir::{CompiledEntry, CompiledGraph, Expr, Stmt};
use crate::value::describe_literal;
use std::fmt::{self, Display, Write};

/// Render `graph` as a Rust-like listing
pub fn render(graph: &CompiledGraph) -> String {
    graph.to_string()
}

impl Display for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "impl CompiledContainer {{")?;
        for (position, entry) in self.entries().iter().enumerate() {
            if position > 0 {
                writeln!(f)?;
            }
            write_entry(f, self, entry)?;
        }
        writeln!(f, "}}")
    }
}

impl Display for CompiledEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_entry(f, &CompiledGraph::default(), self)
    }
}

fn write_entry(f: &mut fmt::Formatter<'_>, graph: &CompiledGraph, entry: &CompiledEntry) -> fmt::Result {
    let return_type = if entry.return_type().is_empty() {
        "_"
    } else {
        entry.return_type()
    };

    writeln!(f, "    // {}", entry.id())?;
    if entry.is_singleton() {
        writeln!(f, "    #[singleton]")?;
    }
    writeln!(f, "    fn {}(&self) -> Arc<{}> {{", entry.accessor(), return_type)?;

    for stmt in entry.stmts() {
        let mut line = String::new();
        write_stmt(&mut line, graph, stmt)?;
        writeln!(f, "        {line}")?;
    }

    let mut tail = String::new();
    write_expr(&mut tail, graph, entry.expr())?;
    writeln!(f, "        {tail}")?;
    writeln!(f, "    }}")
}

fn write_stmt(out: &mut String, graph: &CompiledGraph, stmt: &Stmt) -> fmt::Result {
    match stmt {
        Stmt::Construct {
            slot, class, args, ..
        } => {
            write!(out, "let mut v{slot} = {class}::new(")?;
            write_args(out, graph, args)?;
            out.push_str(");");
        }
        Stmt::Setup {
            slot,
            target,
            immutable,
            args,
            ..
        } => {
            let method = target.rsplit("::").next().unwrap_or(target);
            if *immutable {
                write!(out, "let mut v{slot} = v{slot}.{method}(")?;
            } else {
                write!(out, "v{slot}.{method}(")?;
            }
            write_args(out, graph, args)?;
            out.push_str(");");
        }
    }
    Ok(())
}

fn write_args(out: &mut String, graph: &CompiledGraph, args: &[Expr]) -> fmt::Result {
    for (position, arg) in args.iter().enumerate() {
        if position > 0 {
            out.push_str(", ");
        }
        write_expr(out, graph, arg)?;
    }
    Ok(())
}

fn write_expr(out: &mut String, graph: &CompiledGraph, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Literal { value, type_name } => match describe_literal(value.as_ref()) {
            Some(literal) => out.push_str(&literal),
            None if type_name.is_empty() => out.push_str("<value>"),
            None => write!(out, "<{type_name}>")?,
        },
        Expr::Service(id) => match graph.get(id) {
            Some(entry) => write!(out, "self.{}()", entry.accessor())?,
            None => write!(out, "self.get({id:?})")?,
        },
        Expr::Local(slot) => write!(out, "v{slot}")?,
        Expr::CallFunction { name, args, .. } => {
            write!(out, "{name}(")?;
            write_args(out, graph, args)?;
            out.push(')');
        }
        Expr::CallMethod {
            name,
            receiver,
            args,
            ..
        } => {
            let method = name.rsplit("::").next().unwrap_or(name);
            write_expr(out, graph, receiver)?;
            write!(out, ".{method}(")?;
            write_args(out, graph, args)?;
            out.push(')');
        }
        Expr::InvokeFactory(object) => {
            write_expr(out, graph, object)?;
            out.push_str(".create(self)");
        }
        Expr::List(items) => {
            out.push_str("vec![");
            write_args(out, graph, items)?;
            out.push(']');
        }
        Expr::Tagged { tag, lazy, members } => {
            let kind = if *lazy { "LazyTagged" } else { "TaggedValues" };
            write!(out, "{kind}::new({tag:?}, [")?;
            for (position, (key, id)) in members.iter().enumerate() {
                if position > 0 {
                    out.push_str(", ");
                }
                write!(out, "({key:?}, {id:?})")?;
            }
            out.push_str("])");
        }
        Expr::Proxy(id) => write!(out, "ProxyClosure::new({id:?})")?,
        Expr::Block { stmts, value } => {
            out.push_str("{ ");
            for stmt in stmts {
                write_stmt(out, graph, stmt)?;
                out.push(' ');
            }
            write_expr(out, graph, value)?;
            out.push_str(" }");
        }
        Expr::Argument { value, default, .. } => {
            write_expr(out, graph, value)?;
            if let Some(default) = default {
                let literal = describe_literal(default.as_ref()).unwrap_or_else(|| "<default>".into());
                write!(out, ".or({literal})")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::definition::{ArgumentSpec, Definition};
    use crate::descriptor::{ClassDescriptor, ParamDescriptor};

    struct Pool;
    struct Repo;

    #[test]
    fn test_render_accessors_and_calls() {
        let pool = ClassDescriptor::named::<Pool, _>("Pool", [ParamDescriptor::new("size")], |_| Ok(Pool));
        let repo = ClassDescriptor::named::<Repo, _>(
            "Repo",
            [ParamDescriptor::new("pool").typed("db.pool")],
            |_| Ok(Repo),
        );

        let container = Container::new();
        container
            .register(
                "db.pool",
                Definition::autowire(pool).bind("size", ArgumentSpec::value(4u32)).singleton(),
            )
            .unwrap();
        container.register("repo", Definition::autowire(repo)).unwrap();
        container.register("alias", Definition::reference("repo")).unwrap();

        let listing = render(&container.compile().unwrap());

        assert!(listing.starts_with("impl CompiledContainer {"));
        assert!(listing.contains("#[singleton]\n    fn get_db_pool(&self) -> Arc<Pool> {"));
        assert!(listing.contains("let mut v0 = Pool::new(4);"));
        assert!(listing.contains("let mut v0 = Repo::new(self.get_db_pool());"));
        assert!(listing.contains("fn get_alias(&self) -> Arc<Repo> {\n        self.get_repo()"));
    }

    #[test]
    fn test_render_default_fallback() {
        let repo = ClassDescriptor::named::<Repo, _>(
            "Repo",
            [ParamDescriptor::new("size").typed("pool.size").default_value(8u32)],
            |_| Ok(Repo),
        );

        let container = Container::new();
        container.register("pool.size", Definition::value(4u32)).unwrap();
        container.register("repo", Definition::autowire(repo)).unwrap();

        let listing = render(&container.compile().unwrap());
        assert!(listing.contains("let mut v0 = Repo::new(self.get_pool_size().or(8));"));
    }

    #[test]
    fn test_render_empty_graph() {
        assert_eq!(render(&CompiledGraph::default()), "impl CompiledContainer {\n}\n");
    }
}
