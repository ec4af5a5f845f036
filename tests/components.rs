//! Component and monitoring registry behavior through the engine facade.

mod common;

use planvisor::{
    Component, ComponentField, Config, Monitoring, RegistryError, Status,
};

use common::{engine_with_mocks, register_component};

#[tokio::test]
async fn registered_components_are_listed_with_pending_status() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;

    engine
        .components
        .register(Component::new("A", "a", "mock", "1.0.0"))
        .await
        .unwrap();
    engine
        .components
        .register(Component::new("B", "b", "mock", "1.0.0"))
        .await
        .unwrap();

    assert_eq!(engine.components.list().await.len(), 2);

    let a = engine.components.get("A").await.unwrap();
    assert_eq!(a.status_history.unwrap().status(), Status::Pending);
}

#[tokio::test]
async fn unknown_controller_kind_is_rejected() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;

    let err = engine
        .components
        .register(Component::new("A", "a", "unknown", "1.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownType { .. }));
}

#[tokio::test]
async fn duplicate_registration_fails() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "A").await;

    let err = engine
        .components
        .register(Component::new("A", "a", "mock", "1.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
}

#[tokio::test]
async fn get_by_and_find_select_components() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "api").await;
    register_component(&engine, "db").await;

    let by_name = engine
        .components
        .get_by(ComponentField::Name, "api")
        .await
        .unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id, "api");

    let all = engine.components.find(|c| c.version == "1.0.0").await;
    assert_eq!(all.len(), 2);

    let none = engine
        .components
        .get_by(ComponentField::Version, "0.0.1")
        .await;
    assert!(matches!(none, Err(RegistryError::NotFound { .. })));
}

#[tokio::test]
async fn monitoring_registry_mirrors_component_crud() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;

    let stored = engine
        .monitorings
        .register(Monitoring::new("m1", "probe", "monitor"))
        .await
        .unwrap();
    assert_eq!(stored.status_history.unwrap().status(), Status::Pending);
    assert_eq!(
        stored.event_history.unwrap().snapshot()[0].message,
        "Created monitoring!"
    );

    let err = engine
        .monitorings
        .register(Monitoring::new("m2", "probe", "unknown"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownType { .. }));

    engine.monitorings.delete("m1").await.unwrap();
    assert!(engine.monitorings.get("m1").await.is_err());
}

#[tokio::test]
async fn component_documents_serialize_with_type_field() {
    let (engine, _, _) = engine_with_mocks(Config::default()).await;
    register_component(&engine, "api").await;

    let component = engine.components.get("api").await.unwrap();
    let json = serde_json::to_value(&component).unwrap();
    assert_eq!(json["type"], "mock");
    assert_eq!(json["version"], "1.0.0");
    assert_eq!(json["status_history"]["current"]["status"], "pending");
    assert_eq!(json["event_history"][0]["message"], "Created component!");
}
