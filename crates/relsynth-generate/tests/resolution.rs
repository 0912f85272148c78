use std::collections::BTreeSet;

use relsynth_core::{Entity, GeneratedStore, Relation, Schema, StoreError};
use relsynth_generate::{
    BatchSource, GenerateOptions, GenerationEngine, GenerationError, GenerationPlan,
    GenerationResult,
};

#[derive(Debug, Clone, Default)]
struct Office {
    id: i64,
    region: String,
}

#[derive(Debug, Clone, Default)]
struct Agent {
    id: i64,
    region: String,
    office_id: Option<i64>,
}

fn offices() -> Vec<Office> {
    [(1, "EU"), (2, "US"), (3, "EU"), (4, "US"), (5, "EU")]
        .into_iter()
        .map(|(id, region)| Office {
            id,
            region: region.to_string(),
        })
        .collect()
}

fn agents(region: &str, count: usize) -> Vec<Agent> {
    (0..count)
        .map(|_| Agent {
            region: region.to_string(),
            ..Agent::default()
        })
        .collect()
}

fn office_entity() -> Entity<Office, i64> {
    Entity::new(|o: &Office| o.id, |o: &mut Office, id| o.id = id)
}

fn agent_entity(relation: Relation<Agent, Office, i64>) -> Entity<Agent, i64> {
    Entity::new(|a: &Agent| a.id, |a: &mut Agent, id| a.id = id).relation(relation)
}

fn office_link() -> Relation<Agent, Office, i64> {
    Relation::new(|a: &mut Agent, id: Option<i64>| a.office_id = id)
}

fn schema(relation: Relation<Agent, Office, i64>) -> Schema {
    Schema::builder()
        .entity(office_entity())
        .entity(agent_entity(relation))
        .build()
        .expect("schema builds")
}

fn same_region() -> Relation<Agent, Office, i64> {
    office_link().filter(|agent: &Agent, office: &Office| agent.region == office.region)
}

fn engine() -> GenerationEngine {
    GenerationEngine::new(GenerateOptions::seeded(7))
}

#[test]
fn predicate_restricts_targets_to_matching_region() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(30)
        .synthesize_with(|count, _| agents("EU", count));

    let result = engine().run(&schema, plan).expect("generation succeeds");
    let agents = result.store.get::<Agent>().expect("agents stored");
    let eu: Vec<i64> = offices()
        .iter()
        .filter(|office| office.region == "EU")
        .map(|office| office.id)
        .collect();

    assert_eq!(agents.len(), 30);
    assert!(
        agents
            .iter()
            .all(|agent| agent.office_id.is_some_and(|id| eu.contains(&id)))
    );

    let ids: Vec<i64> = agents.iter().map(|agent| agent.id).collect();
    assert_eq!(ids, (1..=30).collect::<Vec<_>>());
}

#[test]
fn prefilled_batches_are_reported_as_such() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(2)
        .synthesize_with(|count, _| agents("US", count));

    let result = engine().run(&schema, plan).expect("generation succeeds");
    let office_report = result.report.type_report("Office").expect("office report");
    assert_eq!(office_report.source, BatchSource::Prefilled);
    assert_eq!(office_report.generated, 5);

    let agent_report = result.report.type_report("Agent").expect("agent report");
    assert_eq!(agent_report.source, BatchSource::Synthesized);
    assert_eq!(agent_report.relations[0].bound, 2);
    assert_eq!(result.report.order, vec!["Office", "Agent"]);
}

#[test]
fn required_relation_fails_when_predicate_excludes_everything() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(3)
        .synthesize_with(|count, _| agents("APAC", count));

    let err = engine().run(&schema, plan).unwrap_err();
    match err {
        GenerationError::NoEligibleTargets {
            entity,
            target,
            index,
            candidates,
            ..
        } => {
            assert_eq!(entity, "Agent");
            assert_eq!(target, "Office");
            assert_eq!(index, 0);
            assert_eq!(candidates, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn required_relation_fails_when_target_type_is_absent() {
    let schema = schema(office_link());
    let plan = GenerationPlan::new()
        .exact::<Agent>(3)
        .synthesize_with(|count, _| agents("EU", count));

    let err = engine().run(&schema, plan).unwrap_err();
    assert!(matches!(err, GenerationError::NoTargets { ref target, .. } if target == "Office"));
    assert!(err.to_string().contains("no instances of 'Office' exist"));
}

#[test]
fn optional_relation_with_empty_target_type_is_nulled() {
    let schema = schema(office_link().optional());
    let plan = GenerationPlan::new()
        .exact::<Office>(0)
        .exact::<Agent>(4)
        .synthesize_with(|count, _| agents("EU", count));

    let result = engine().run(&schema, plan).expect("generation succeeds");
    assert!(result.store.get::<Office>().expect("offices present").is_empty());

    let agents = result.store.get::<Agent>().expect("agents stored");
    assert_eq!(agents.len(), 4);
    assert!(agents.iter().all(|agent| agent.office_id.is_none()));
    let report = result.report.type_report("Agent").expect("agent report");
    assert_eq!(report.relations[0].nulled, 4);
}

#[test]
fn ideal_count_with_no_eligible_targets_and_zero_min_succeeds_empty() {
    let schema = schema(office_link().filter(|_, _| false));
    let plan = GenerationPlan::new()
        .prefill(offices())
        .ideal::<Agent>(10, 0)
        .synthesize_with(|count, _| agents("EU", count));

    let result = engine().run(&schema, plan).expect("generation succeeds");
    assert!(result.store.get::<Agent>().expect("agents present").is_empty());

    let report = result.report.type_report("Agent").expect("agent report");
    assert_eq!(report.generated, 10);
    assert_eq!(report.survived, 0);
    assert_eq!(report.discarded, 10);
}

#[test]
fn ideal_count_survivors_stay_within_bounds() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .ideal::<Agent>(40, 10)
        .synthesize_with(|count, _| {
            (0..count)
                .map(|index| Agent {
                    region: if index % 3 == 0 { "APAC" } else { "EU" }.to_string(),
                    ..Agent::default()
                })
                .collect()
        });

    let result = engine().run(&schema, plan).expect("generation succeeds");
    let report = result.report.type_report("Agent").expect("agent report");
    let agents = result.store.get::<Agent>().expect("agents stored");

    assert!((10..=40).contains(&report.survived));
    assert_eq!(report.generated - report.discarded, report.survived);
    assert_eq!(report.discarded, 14);
    assert_eq!(agents.len() as u64, report.survived);
    assert!(agents.iter().all(|agent| agent.region == "EU"));
}

#[test]
fn ideal_count_below_min_reports_shortfall() {
    let schema = schema(office_link().filter(|_, _| false));
    let plan = GenerationPlan::new()
        .prefill(offices())
        .ideal::<Agent>(10, 5)
        .synthesize_with(|count, _| agents("EU", count));

    let err = engine().run(&schema, plan).unwrap_err();
    match err {
        GenerationError::IdealShortfall {
            entity,
            generated,
            survived,
            discarded,
            min,
        } => {
            assert_eq!(entity, "Agent");
            assert_eq!((generated, survived, discarded, min), (10, 0, 10, 5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[derive(Debug, Clone, Default)]
struct Vault {
    id: u32,
    clearance: u8,
}

#[derive(Debug, Clone, Default)]
struct Guard {
    id: u32,
    clearance: u8,
    vault_id: Option<u32>,
}

fn vault_schema() -> Schema {
    Schema::builder()
        .entity(Entity::new(|v: &Vault| v.id, |v: &mut Vault, id| v.id = id))
        .entity(
            Entity::new(|g: &Guard| g.id, |g: &mut Guard, id| g.id = id).relation(
                Relation::new(|g: &mut Guard, id: Option<u32>| g.vault_id = id)
                    .unique()
                    .filter(|guard: &Guard, vault: &Vault| guard.clearance <= vault.clearance),
            ),
        )
        .build()
        .expect("schema builds")
}

fn vault_plan(guards: usize) -> GenerationPlan {
    GenerationPlan::new()
        .exact::<Vault>(5)
        .synthesize_with(|count, _| vec![Vault { id: 0, clearance: 3 }; count])
        .synthesize_with(|count, _| {
            vec![
                Guard {
                    clearance: 3,
                    ..Guard::default()
                };
                count
            ]
        })
        .exact::<Guard>(guards)
}

#[test]
fn unique_relation_binds_distinct_targets() {
    let result = engine()
        .run(&vault_schema(), vault_plan(5))
        .expect("generation succeeds");

    let mut bound: Vec<u32> = result
        .store
        .get::<Guard>()
        .expect("guards stored")
        .iter()
        .filter_map(|guard| guard.vault_id)
        .collect();
    bound.sort_unstable();
    assert_eq!(bound, vec![1, 2, 3, 4, 5]);
}

#[test]
fn unique_relation_fails_when_pool_runs_out() {
    let err = engine().run(&vault_schema(), vault_plan(6)).unwrap_err();
    assert!(matches!(
        err,
        GenerationError::UniquePoolExhausted {
            index: 5,
            eligible: 5,
            ..
        }
    ));
}

#[test]
fn unique_relation_discards_overflow_for_ideal_count() {
    let plan = vault_plan(6).ideal::<Guard>(6, 5);
    let result = engine()
        .run(&vault_schema(), plan)
        .expect("generation succeeds");

    let guards = result.store.get::<Guard>().expect("guards stored");
    assert_eq!(guards.len(), 5);
    let mut bound: Vec<u32> = guards.iter().filter_map(|guard| guard.vault_id).collect();
    bound.sort_unstable();
    bound.dedup();
    assert_eq!(bound.len(), 5);
}

#[derive(Debug, Clone, Default)]
struct Customer {
    id: i64,
    vip: bool,
}

#[derive(Debug, Clone, Default)]
struct Order {
    id: i64,
    customer_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
struct Shipment {
    id: i64,
    order_id: Option<i64>,
}

fn is_vip_order(order: &Order, store: &GeneratedStore) -> bool {
    store.get::<Customer>().is_ok_and(|customers| {
        customers
            .iter()
            .any(|customer| customer.vip && order.customer_id == Some(customer.id))
    })
}

#[test]
fn context_predicate_looks_back_into_the_store() {
    let schema = Schema::builder()
        .entity(
            Entity::new(|s: &Shipment| s.id, |s: &mut Shipment, id| s.id = id).relation(
                Relation::new(|s: &mut Shipment, id: Option<i64>| s.order_id = id)
                    .filter_with_context(|_: &Shipment, order: &Order, store: &GeneratedStore| {
                        is_vip_order(order, store)
                    }),
            ),
        )
        .entity(
            Entity::new(|o: &Order| o.id, |o: &mut Order, id| o.id = id).relation(
                Relation::<Order, Customer, i64>::new(|o, id| o.customer_id = id),
            ),
        )
        .entity(Entity::new(|c: &Customer| c.id, |c: &mut Customer, id| c.id = id))
        .build()
        .expect("schema builds");

    let plan = GenerationPlan::new()
        .exact::<Customer>(6)
        .synthesize_with(|count, _| {
            (0..count)
                .map(|index| Customer {
                    id: 0,
                    vip: index % 2 == 0,
                })
                .collect()
        })
        .exact::<Order>(20)
        .synthesize_with(|count, _| vec![Order::default(); count])
        .exact::<Shipment>(15)
        .synthesize_with(|count, _| vec![Shipment::default(); count]);

    let result = engine().run(&schema, plan).expect("generation succeeds");
    let store = &result.store;
    let orders = store.get::<Order>().expect("orders stored");
    let shipments = store.get::<Shipment>().expect("shipments stored");

    assert_eq!(shipments.len(), 15);
    for shipment in shipments {
        let order = orders
            .iter()
            .find(|order| Some(order.id) == shipment.order_id)
            .expect("shipment references an order");
        assert!(is_vip_order(order, store));
    }

    let tags: Vec<&str> = store.tags().map(|tag| tag.short_name()).collect();
    assert_eq!(tags, vec!["Customer", "Order", "Shipment"]);
}

#[derive(Debug, Clone, Default)]
struct Employee {
    id: u32,
    manager_id: Option<u32>,
}

#[test]
fn self_referential_relation_resolves_within_the_batch() {
    let schema = Schema::builder()
        .entity(
            Entity::new(|e: &Employee| e.id, |e: &mut Employee, id| e.id = id).relation(
                Relation::new(|e: &mut Employee, id: Option<u32>| e.manager_id = id)
                    .optional()
                    .filter(|employee: &Employee, manager: &Employee| manager.id < employee.id),
            ),
        )
        .build()
        .expect("schema builds");
    assert_eq!(schema.generation_order().len(), 1);

    let plan = GenerationPlan::new()
        .exact::<Employee>(12)
        .synthesize_with(|count, _| vec![Employee::default(); count]);
    let result = engine().run(&schema, plan).expect("generation succeeds");
    let employees = result.store.get::<Employee>().expect("employees stored");

    assert_eq!(employees[0].manager_id, None);
    for employee in &employees[1..] {
        assert!(
            employee
                .manager_id
                .is_some_and(|manager| manager < employee.id)
        );
    }
}

#[test]
fn skipped_types_are_not_present_in_the_store() {
    let schema = schema(office_link().optional());
    let plan = GenerationPlan::new()
        .exact::<Agent>(2)
        .synthesize_with(|count, _| agents("EU", count));

    let result = engine().run(&schema, plan).expect("generation succeeds");
    let err = result.store.get::<Office>().unwrap_err();
    assert_eq!(err, StoreError::TypeNotPresent("Office".to_string()));
    assert_eq!(result.store.len(), 1);
}

#[test]
fn post_processors_run_in_order_with_store_access() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(3)
        .synthesize_with(|count, _| agents("EU", count))
        .post_process(|store| {
            for agent in store.get_mut::<Agent>()? {
                agent.region = "EU-WEST".to_string();
            }
            Ok(())
        })
        .post_process(|store| {
            let agents = store.get::<Agent>()?;
            if agents.iter().any(|agent| agent.region != "EU-WEST") {
                return Err("region rewrite did not run first".into());
            }
            Ok(())
        });

    let result = engine().run(&schema, plan).expect("generation succeeds");
    assert_eq!(result.report.post_processors, 2);
    assert!(
        result
            .store
            .get::<Agent>()
            .expect("agents stored")
            .iter()
            .all(|agent| agent.region == "EU-WEST")
    );
}

#[test]
fn post_processor_errors_surface_verbatim() {
    let schema = schema(same_region());
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(3)
        .synthesize_with(|count, _| agents("EU", count))
        .post_process(|_| Err("every agent needs a badge".into()));

    let err = engine().run(&schema, plan).unwrap_err();
    assert!(matches!(err, GenerationError::Invariant(_)));
    assert_eq!(err.to_string(), "every agent needs a badge");
}

#[test]
fn callback_panics_become_generation_errors() {
    let schema = schema(office_link().filter(|agent: &Agent, _: &Office| {
        if agent.region == "PANIC" {
            panic!("predicate blew up");
        }
        true
    }));
    let plan = GenerationPlan::new()
        .prefill(offices())
        .exact::<Agent>(1)
        .synthesize_with(|count, _| agents("PANIC", count));

    let err = engine().run(&schema, plan).unwrap_err();
    match err {
        GenerationError::Panicked(message) => assert_eq!(message, "predicate blew up"),
        other => panic!("unexpected error: {other}"),
    }
}

#[derive(Debug, Clone, Default)]
struct Department {
    id: u32,
}

#[derive(Debug, Clone, Default)]
struct Staff {
    id: u32,
    manager_id: Option<u32>,
    department_id: Option<u32>,
}

fn staff_entity(manager_required: bool, manager_first: bool) -> Entity<Staff, u32> {
    let manager = Relation::<Staff, Staff, u32>::new(|s, id| s.manager_id = id)
        .required(manager_required);
    let even_only = Relation::<Staff, Department, u32>::new(|s, id| s.department_id = id)
        .filter(|staff: &Staff, _: &Department| staff.id % 2 == 0);

    let staff = Entity::new(|s: &Staff| s.id, |s: &mut Staff, id| s.id = id);
    if manager_first {
        staff.relation(manager).relation(even_only)
    } else {
        staff.relation(even_only).relation(manager)
    }
}

fn staff_run(manager_required: bool, manager_first: bool, seed: u64) -> GenerationResult {
    let schema = Schema::builder()
        .entity(Entity::new(|d: &Department| d.id, |d: &mut Department, id| d.id = id))
        .entity(staff_entity(manager_required, manager_first))
        .build()
        .expect("schema builds");
    let plan = GenerationPlan::new()
        .exact::<Department>(3)
        .synthesize_with(|count, _| vec![Department::default(); count])
        .ideal::<Staff>(20, 0)
        .synthesize_with(|count, _| vec![Staff::default(); count]);

    GenerationEngine::new(GenerateOptions::seeded(seed))
        .run(&schema, plan)
        .expect("generation succeeds")
}

fn assert_managers_survive(staff: &[Staff]) {
    let survivors: BTreeSet<u32> = staff.iter().map(|s| s.id).collect();
    for member in staff {
        if let Some(manager) = member.manager_id {
            assert!(
                survivors.contains(&manager),
                "staff {} references discarded manager {manager}",
                member.id
            );
        }
    }
}

#[test]
fn required_self_reference_drops_sources_bound_to_later_discards() {
    for seed in [7, 8, 9] {
        let result = staff_run(true, true, seed);
        let staff = result.store.get::<Staff>().expect("staff stored");
        let report = result.report.type_report("Staff").expect("staff report");

        assert!(staff.iter().all(|s| s.id % 2 == 0));
        assert!(staff.iter().all(|s| s.manager_id.is_some()));
        assert_managers_survive(staff);
        assert_eq!(report.generated - report.discarded, report.survived);
        assert_eq!(staff.len() as u64, report.survived);
    }
}

#[test]
fn optional_self_reference_nulls_bindings_to_later_discards() {
    let result = staff_run(false, true, 7);
    let staff = result.store.get::<Staff>().expect("staff stored");
    let report = result.report.type_report("Staff").expect("staff report");

    assert_eq!(staff.len(), 10);
    assert!(staff.iter().all(|s| s.department_id.is_some()));
    assert_managers_survive(staff);
    let nulled = staff.iter().filter(|s| s.manager_id.is_none()).count() as u64;
    assert_eq!(report.relations[0].nulled, nulled);
}

#[test]
fn self_reference_skips_instances_discarded_by_earlier_relations() {
    let result = staff_run(true, false, 7);
    let staff = result.store.get::<Staff>().expect("staff stored");

    assert_eq!(staff.len(), 10);
    assert!(staff.iter().all(|s| s.manager_id.is_some_and(|m| m % 2 == 0)));
    assert_managers_survive(staff);
}
