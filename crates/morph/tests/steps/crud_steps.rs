use cucumber::{then, when};
use morph::testing::to_document;
use morph_api::{ID_FIELD, ReadQuery, id_list};
use serde_json::Value;

use crate::MorphWorld;

/// Parse a JSON payload, replacing `"$alias"` strings with recorded ids.
fn payload(world: &MorphWorld, raw: &str) -> Value {
    let mut text = raw.to_string();
    for (alias, id) in &world.ids {
        text = text.replace(&format!("\"${}\"", alias), &format!("\"{}\"", id));
    }
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("bad payload {}: {}", raw, e))
}

#[when(regex = r#"^I create an? "(\w+)" with (\{.*\}) as "(\w+)"$"#)]
async fn create_instance(world: &mut MorphWorld, entity: String, body: String, alias: String) {
    let body = to_document(payload(world, &body));
    let role = world.role().to_string();
    let result = world.platform.platform.executor.create(&role, &entity, body).await;
    match result {
        Ok(outcome) => {
            assert!(outcome.sync.is_clean(), "{:?}", outcome.sync);
            let id = outcome.document[ID_FIELD].as_str().unwrap().to_string();
            world.ids.insert(alias, id);
            world.last_error = None;
        }
        Err(e) => world.last_error = Some(e),
    }
}

#[when(regex = r#"^I update "(\w+)" "(\w+)" with (\{.*\})$"#)]
async fn update_instance(world: &mut MorphWorld, entity: String, alias: String, body: String) {
    let mut body = to_document(payload(world, &body));
    body.insert(ID_FIELD.to_string(), Value::String(world.id(&alias)));
    let role = world.role().to_string();
    let result = world.platform.platform.executor.update(&role, &entity, body).await;
    match result {
        Ok(outcome) => {
            assert!(outcome.sync.is_clean(), "{:?}", outcome.sync);
            world.last_error = None;
        }
        Err(e) => world.last_error = Some(e),
    }
}

#[when(regex = r#"^I delete "(\w+)" "(\w+)"$"#)]
async fn delete_instance(world: &mut MorphWorld, entity: String, alias: String) {
    let id = world.id(&alias);
    let role = world.role().to_string();
    let result = world.platform.platform.executor.delete(&role, &entity, &id).await;
    match result {
        Ok(_) => world.last_error = None,
        Err(e) => world.last_error = Some(e),
    }
}

#[when(regex = r#"^I search "(\w+)" for "([^"]*)"$"#)]
async fn search_instances(world: &mut MorphWorld, entity: String, term: String) {
    let role = world.role().to_string();
    let result = world
        .platform
        .platform
        .executor
        .read(&role, &entity, &ReadQuery::search(term))
        .await;
    match result {
        Ok(result) => {
            world.last_page = result.into_page();
            world.last_error = None;
        }
        Err(e) => world.last_error = Some(e),
    }
}

#[then("the operation succeeds")]
async fn operation_succeeds(world: &mut MorphWorld) {
    if let Some(e) = &world.last_error {
        panic!("expected success, got {}", e);
    }
}

#[then(regex = r#"^the operation fails with "(\w+)"$"#)]
async fn operation_fails(world: &mut MorphWorld, code: String) {
    let error = world.last_error.as_ref().expect("expected an error");
    assert_eq!(error.code(), code, "{}", error);
}

#[then(regex = r#"^the page has (\d+) items?$"#)]
async fn page_size(world: &mut MorphWorld, count: usize) {
    let page = world.last_page.as_ref().expect("no page read");
    assert_eq!(page.items.len(), count);
    assert_eq!(page.total, count);
}

#[then(regex = r#"^"(\w+)" "(\w+)" has "(\w+)" equal to (\[.*\])$"#)]
async fn stored_ids_equal(
    world: &mut MorphWorld,
    entity: String,
    alias: String,
    field: String,
    expected: String,
) {
    let expected = id_list(Some(&payload(world, &expected)));
    let stored = world
        .platform
        .raw(&entity, &world.id(&alias))
        .await
        .unwrap_or_else(|| panic!("{} {} is gone", entity, alias));
    let mut actual = id_list(stored.get(&field));
    let mut expected = expected;
    actual.sort();
    expected.sort();
    assert_eq!(actual, expected, "{}.{} of {}", entity, field, alias);
}

#[then(regex = r#"^"(\w+)" "(\w+)" still exists$"#)]
async fn still_exists(world: &mut MorphWorld, entity: String, alias: String) {
    assert!(world.platform.raw(&entity, &world.id(&alias)).await.is_some());
}

#[then(regex = r#"^"(\w+)" "(\w+)" no longer exists$"#)]
async fn no_longer_exists(world: &mut MorphWorld, entity: String, alias: String) {
    assert!(world.platform.raw(&entity, &world.id(&alias)).await.is_none());
}
