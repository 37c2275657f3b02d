use std::sync::Arc;

use exitstack_di::{
    Arguments, Blueprint, Container, Dependency, DynError, FromResources, RequireError, Resources,
};

fn main() {
    let blueprint = Blueprint::builder()
        .register(
            Dependency::from_fn("service", |args: Arguments| {
                let db = args.get::<Database>("db")?;
                Ok::<_, DynError>(Service { db })
            })
            .reference("db", "db"),
        )
        .register(
            Dependency::new("db", |args: Arguments| async move {
                let url = args.get::<String>("url")?;
                println!("connecting to {url}");
                Ok::<_, DynError>(Database { url: url.to_string() })
            })
            .arg("url", "postgres://localhost/demo".to_string())
            .on_exit(|db: Arc<Database>| async move {
                println!("disconnecting from {}", db.url);
                Ok::<_, DynError>(())
            }),
        )
        .build();

    println!("{:?}", blueprint.resolution_order().unwrap());

    let container = Container::new(blueprint, "demo".to_string());
    let app = futures::executor::block_on(container.activate()).unwrap();

    println!("{:?}", app);
    let handles = app.extract::<Handles>().unwrap();
    println!("{:?} ({})", handles.service, app.settings());

    futures::executor::block_on(container.deactivate()).unwrap();
}

#[derive(Debug)]
struct Database {
    url: String,
}

#[derive(Debug)]
#[allow(dead_code)]
struct Service {
    db: Arc<Database>,
}

struct Handles {
    service: Arc<Service>,
}
impl FromResources<String> for Handles {
    fn from_resources(resources: &Resources<String>) -> Result<Self, RequireError> {
        Ok(Handles {
            service: resources.require("service")?,
        })
    }
}
