use relsynth_core::{Entity, Relation, Schema};

#[derive(Debug)]
struct Author {
    id: u32,
}

#[derive(Debug)]
struct Book {
    id: u32,
    author_id: Option<u32>,
    sequel_of: Option<u32>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::builder()
        .entity(
            Entity::new(|b: &Book| b.id, |b: &mut Book, id| b.id = id)
                .relation(Relation::<Book, Author, u32>::new(|b, id| b.author_id = id))
                .relation(
                    Relation::<Book, Book, u32>::new(|b, id| b.sequel_of = id)
                        .named("sequel")
                        .optional(),
                ),
        )
        .entity(Entity::new(|a: &Author| a.id, |a: &mut Author, id| a.id = id))
        .build()?;

    for relation in schema.relations() {
        println!("{}", relation.label());
    }
    println!("{}", serde_json::to_string_pretty(schema.graph_report())?);
    Ok(())
}
