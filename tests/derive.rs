//! `#[derive(Autowire)]` against a live container

use contextual_di::{Autowire, Container, Identifier, Parameters, Proxy, Resolver, ScopeConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Autowire)]
#[autowire(singleton)]
struct Config {
    #[inject(default = String::from("app"))]
    name: String,
    #[inject(default = 8080u16)]
    port: u16,
}

#[derive(Autowire)]
struct Cache;

#[derive(Autowire)]
struct UserService {
    config: Arc<Config>,
    cache: Option<Arc<Cache>>,
    #[inject(id = "request.user")]
    user: Arc<String>,
    #[inject(skip)]
    hits: u64,
}

#[derive(Autowire)]
struct Mailer {
    #[inject(hint = "transport.smtp")]
    transport: Arc<String>,
}

#[derive(Autowire)]
struct Pipeline {
    #[inject(variadic)]
    stages: Vec<Arc<String>>,
}

#[derive(Autowire)]
#[autowire(singleton)]
struct Parent {
    child: Arc<Child>,
}

#[derive(Autowire)]
struct Child {
    #[inject(proxy)]
    parent: Proxy<Parent>,
}

static FLUSHED: AtomicUsize = AtomicUsize::new(0);

#[derive(Autowire)]
#[autowire(scope = "request", finalize = flush)]
struct Session {
    #[inject(id = "request.user")]
    user: Arc<String>,
}

impl Session {
    fn flush(&self) {
        FLUSHED.fetch_add(1, Ordering::SeqCst);
    }
}

fn request(user: &str) -> ScopeConfig {
    ScopeConfig::new("request").instance(Identifier::alias("request.user"), user.to_string())
}

#[test]
fn defaults_fill_value_fields() {
    let container = Container::new();
    container.declare::<Config>();

    let config = container.resolve::<Config>().unwrap();
    assert_eq!(config.name, "app");
    assert_eq!(config.port, 8080);
    assert!(Arc::ptr_eq(&config, &container.resolve::<Config>().unwrap()));
}

#[test]
fn field_shapes_map_to_parameters() {
    let container = Container::new();
    container.declare::<Config>();
    container.declare::<UserService>();

    let service = container
        .run_scope(request("alice"), |c| c.resolve::<UserService>())
        .unwrap();
    assert_eq!(*service.user, "alice");
    assert_eq!(service.config.name, "app");
    assert!(service.cache.is_none());
    assert_eq!(service.hits, 0);

    container.declare::<Cache>();
    let service = container
        .run_scope(request("bob"), |c| c.resolve::<UserService>())
        .unwrap();
    assert!(service.cache.is_some());
}

#[test]
fn described_parameters_follow_field_order() {
    let container = Container::new();
    container.declare::<UserService>();

    let params = container.describe(Identifier::of::<UserService>()).unwrap();
    let names: Vec<_> = params.iter().map(|p| p.name()).collect();
    assert_eq!(names, ["config", "cache", "user"]);
    assert!(params[1].is_nullable());
    assert_eq!(params[2].declared_type(), Some(&Identifier::alias("request.user")));
}

#[test]
fn hint_replaces_declared_type() {
    let container = Container::new();
    container.declare::<Mailer>();
    container.bind(Identifier::of::<String>(), Resolver::instance(String::from("sendmail")));

    assert!(container.resolve::<Mailer>().is_err());

    container.bind(Identifier::alias("transport.smtp"), Resolver::instance(String::from("smtp")));
    assert_eq!(*container.resolve::<Mailer>().unwrap().transport, "smtp");

    let mailer = container
        .make_as::<Mailer>(
            Identifier::of::<Mailer>(),
            Parameters::new().with_value("transport", String::from("test")),
        )
        .unwrap();
    assert_eq!(*mailer.transport, "test");
}

#[test]
fn variadic_takes_explicit_list() {
    let container = Container::new();
    container.declare::<Pipeline>();

    assert!(container.resolve::<Pipeline>().unwrap().stages.is_empty());

    let pipeline = container
        .make_as::<Pipeline>(
            Identifier::of::<Pipeline>(),
            Parameters::new().with_list(
                "stages",
                vec![
                    contextual_di::Argument::value(String::from("parse")),
                    contextual_di::Argument::value(String::from("emit")),
                ],
            ),
        )
        .unwrap();
    let stages: Vec<_> = pipeline.stages.iter().map(|s| s.as_str()).collect();
    assert_eq!(stages, ["parse", "emit"]);
}

#[test]
fn proxy_field_breaks_cycle() {
    let container = Container::new();
    container.declare::<Parent>();
    container.declare::<Child>();

    let parent = container.resolve::<Parent>().unwrap();
    let back = parent.child.parent.resolve(&container).unwrap();
    assert!(Arc::ptr_eq(&parent, &back));
}

#[test]
fn scoped_type_with_finalizer() {
    let container = Container::new();
    container.declare::<Session>();

    assert!(container.resolve::<Session>().is_err());

    let before = FLUSHED.load(Ordering::SeqCst);
    let user = container.run_scope(request("carol"), |c| {
        let session = c.resolve::<Session>().unwrap();
        assert_eq!(FLUSHED.load(Ordering::SeqCst), before);
        Arc::clone(&session.user)
    });
    assert_eq!(*user, "carol");
    assert_eq!(FLUSHED.load(Ordering::SeqCst), before + 1);
}
