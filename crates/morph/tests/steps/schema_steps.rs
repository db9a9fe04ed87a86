use std::sync::Arc;

use cucumber::{given, then, when};
use morph::RoleTable;
use morph::testing::TestPlatform;
use morph_api::{CrudAction, FieldDescriptor, PrimitiveType};

use crate::MorphWorld;

/// Parse a compact field list such as `name:string!, authors->author,
/// role:select(admin|editor)`. A trailing `!` marks the field required.
fn parse_fields(list: &str) -> Vec<FieldDescriptor> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_field)
        .collect()
}

fn parse_field(item: &str) -> FieldDescriptor {
    let (item, required) = match item.strip_suffix('!') {
        Some(rest) => (rest, true),
        None => (item, false),
    };
    let field = if let Some((name, target)) = item.split_once("->") {
        FieldDescriptor::relation(name.trim(), target.trim())
    } else {
        let (name, kind) = item
            .split_once(':')
            .unwrap_or_else(|| panic!("field '{}' needs a kind", item));
        match kind {
            "string" => FieldDescriptor::string(name).with_hint("text"),
            "number" => FieldDescriptor::new(name, PrimitiveType::Number),
            "boolean" => FieldDescriptor::new(name, PrimitiveType::Boolean),
            "date" => FieldDescriptor::new(name, PrimitiveType::Date),
            "password" => FieldDescriptor::string(name).with_hint("password"),
            select if select.starts_with("select(") => {
                let values = select
                    .trim_start_matches("select(")
                    .trim_end_matches(')')
                    .split('|');
                FieldDescriptor::string(name)
                    .with_hint("select")
                    .with_enum_values(values)
            }
            other => panic!("unknown field kind '{}'", other),
        }
    };
    if required { field.required() } else { field }
}

#[given(regex = r#"^a platform where "(\w+)" may only read$"#)]
async fn read_only_role(world: &mut MorphWorld, role: String) {
    let gate = RoleTable::new()
        .allow(morph::testing::TEST_ROLE, CrudAction::ALL)
        .allow(role, [CrudAction::Read]);
    world.platform = TestPlatform::with_gate(Arc::new(gate));
}

#[given(regex = r#"^I act as "(\w+)"$"#)]
async fn act_as(world: &mut MorphWorld, role: String) {
    world.role = Some(role);
}

#[given(regex = r#"^an entity type "(\w+)" with fields "([^"]*)"$"#)]
async fn define_entity_type(world: &mut MorphWorld, name: String, fields: String) {
    world
        .platform
        .define(&name, parse_fields(&fields))
        .await
        .unwrap_or_else(|e| panic!("define {} failed: {}", name, e));
}

#[when(regex = r#"^I redefine "(\w+)" with fields "([^"]*)"$"#)]
async fn redefine_entity_type(world: &mut MorphWorld, name: String, fields: String) {
    world
        .platform
        .platform
        .schemas
        .redefine(&name, parse_fields(&fields))
        .await
        .unwrap_or_else(|e| panic!("redefine {} failed: {}", name, e));
}

#[given(regex = r#"^I hold the compiled handle for "(\w+)"$"#)]
async fn hold_handle(world: &mut MorphWorld, name: String) {
    let handle = world.platform.platform.registry.resolve(&name).await.unwrap();
    world.held_handle = Some(handle);
}

#[then(regex = r#"^resolving "(\w+)" shows "(\w+)" as required$"#)]
async fn resolved_field_required(world: &mut MorphWorld, name: String, field: String) {
    let handle = world.platform.platform.registry.resolve(&name).await.unwrap();
    let plan = &handle.artifacts.crud_plan;
    assert!(
        plan.required_fields.contains(&field),
        "required fields of {}: {:?}",
        name,
        plan.required_fields
    );
}

#[then(regex = r#"^the held handle does not know field "(\w+)"$"#)]
async fn held_handle_lacks_field(world: &mut MorphWorld, field: String) {
    let handle = world.held_handle.as_ref().expect("no handle held");
    assert!(handle.artifacts.storage_schema.field(&field).is_none());
}
