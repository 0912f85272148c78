use std::env;
use std::path::PathBuf;

use fake::Dummy;
use relsynth_core::{Entity, GeneratedStore, Relation, Schema, SelectionStrategy};
use relsynth_generate::{
    GenerationConfig, GenerationEngine, GenerationPlan, LogFormat, init_logging,
};

#[derive(Debug, Clone, Dummy)]
struct Region {
    code: String,
    #[dummy(faker = "1..20")]
    weight: u32,
}

#[derive(Debug, Clone, Dummy)]
struct Customer {
    id: i64,
    region: Option<String>,
    #[dummy(faker = "0..100")]
    score: u32,
    referrer_id: Option<i64>,
}

#[derive(Debug, Clone, Dummy)]
struct Order {
    id: uuid::Uuid,
    customer_id: Option<i64>,
    #[dummy(faker = "1..1000")]
    total: u32,
}

fn build_schema() -> Result<Schema, Box<dyn std::error::Error>> {
    let schema = Schema::builder()
        .entity(
            Entity::new(|r: &Region| r.code.clone(), |r: &mut Region, code| r.code = code)
                .key_generator(|index| format!("R{index:02}")),
        )
        .entity(
            Entity::new(|c: &Customer| c.id, |c: &mut Customer, id| c.id = id)
                .relation(
                    Relation::new(|c: &mut Customer, code: Option<String>| c.region = code)
                        .weighted(|region: &Region| region.weight as f64),
                )
                .relation(
                    Relation::new(|c: &mut Customer, id: Option<i64>| c.referrer_id = id)
                        .named("referrer")
                        .optional()
                        .filter(|customer: &Customer, referrer: &Customer| {
                            referrer.id < customer.id
                        }),
                ),
        )
        .entity(
            Entity::new(|o: &Order| o.id, |o: &mut Order, id| o.id = id).relation(
                Relation::new(|o: &mut Order, id: Option<i64>| o.customer_id = id)
                    .strategy(SelectionStrategy::RoundRobin)
                    .filter_with_context(|order: &Order, customer: &Customer, _: &GeneratedStore| {
                        order.total < 500 || customer.score >= 50
                    }),
            ),
        )
        .build()?;
    Ok(schema)
}

const DEFAULT_CONFIG: &str = r#"
seed = 42

[counts.Region]
count = 4

[counts.Customer]
count = 50

[counts.Order]
count = 200
min = 150
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Pretty)?;

    let config = match env::args().nth(1).map(PathBuf::from) {
        Some(path) => GenerationConfig::load(&path)?,
        None => GenerationConfig::from_toml_str(DEFAULT_CONFIG)?,
    };

    let schema = build_schema()?;
    println!("{}", serde_json::to_string_pretty(schema.graph_report())?);

    let plan = GenerationPlan::new()
        .faked::<Region>()
        .faked::<Customer>()
        .faked::<Order>()
        .with_config(&schema, &config)?
        .post_process(|store| {
            let orders = store.get::<Order>()?;
            if orders.iter().any(|order| order.customer_id.is_none()) {
                return Err("order without customer".into());
            }
            Ok(())
        });

    let result = GenerationEngine::new(config.options()).run(&schema, plan)?;
    println!("{}", serde_json::to_string_pretty(&result.report)?);
    Ok(())
}
