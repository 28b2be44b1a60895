//! Resolution events as seen through the `contextual_di` log target
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

use contextual_di::{
    Arguments, BoxError, Constructor, Container, Identifier, ParameterRequest, Resolver,
    ScopeConfig, injector_fn,
};

#[allow(dead_code)]
struct Database {
    url: String,
}

#[allow(dead_code)]
struct Logger {
    channel: String,
}

#[allow(dead_code)]
struct UserService {
    db: std::sync::Arc<Database>,
    log: std::sync::Arc<Logger>,
    user: std::sync::Arc<String>,
}

fn main() {
    contextual_di::logging::builder().trace().di_only().init();

    println!("=== Contextual DI Logging Demo ===\n");

    // "Creating new DI container"
    let container = Container::new();

    // "Binding" at debug level
    container.bind_singleton(
        Identifier::of::<Database>(),
        Resolver::from_fn(|| Database {
            url: "postgres://localhost/app".into(),
        }),
    );
    container.register_injector(
        Identifier::of::<Logger>(),
        injector_fn(|context| Logger {
            channel: context.unwrap_or("app").to_string(),
        }),
    );
    container.declare_constructor(Constructor::factory(
        Identifier::of::<UserService>(),
        vec![
            ParameterRequest::of::<Database>("db"),
            ParameterRequest::of::<Logger>("log"),
            ParameterRequest::typed("user", Identifier::alias("request.user")),
        ],
        |args: &Arguments| {
            Ok::<_, BoxError>(UserService {
                db: args.get("db")?,
                log: args.get("log")?,
                user: args.get("user")?,
            })
        },
    ));

    // A bind-time alias loop is only a warning; resolving it is an error.
    container.bind("loop.a", Resolver::alias("loop.b"));
    container.bind("loop.b", Resolver::alias("loop.a"));
    if let Err(err) = container.get("loop.a") {
        println!("  [App] {err}");
    }

    // "Entering scope", "Resolving", "Creating singleton", "Delegating to injector", "Leaving scope"
    let request = ScopeConfig::new("request")
        .instance(Identifier::alias("request.user"), String::from("alice"));
    match container.run_scope(request, |c| c.resolve::<UserService>()) {
        Ok(service) => println!(
            "  [App] resolved UserService for {} (logger channel `{}`)",
            service.user, service.log.channel
        ),
        Err(err) => println!("  [App] {err}"),
    }

    // Outside the request scope the chain ends in a missing user.
    if let Err(err) = container.resolve::<UserService>() {
        println!("  [App] {err}");
        if let Some(trace) = err.trace() {
            println!("{}", trace.render_verbose());
        }
    }

    // Out-of-order leave is logged at error level.
    let outer = container.enter("outer");
    let inner = container.enter("inner");
    if let Err(err) = container.leave(&outer) {
        println!("  [App] {err}");
    }
    let _ = container.leave(&inner);
    let _ = container.leave(&outer);

    println!("\n=== Demo Complete ===");
}
