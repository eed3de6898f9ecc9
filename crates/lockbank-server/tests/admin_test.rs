//! End-to-end administrative flows against a stack assembled from a config file

use std::io::Write;

use lockbank_server::{Command, Configuration, admin, build_stack};

fn config_file(provider: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    write!(
        file,
        "lockbank:\n  lock:\n    provider: {}\n  transfer:\n    lock-wait-ms: 1000\n    lock-lease-ms: 5000\n",
        provider
    )
    .unwrap();
    file
}

#[tokio::test]
async fn test_demo_under_each_provider() {
    for provider in ["cache", "coordination-service"] {
        let file = config_file(provider);
        let configuration =
            Configuration::load(&file.path().to_string_lossy(), None, None).unwrap();
        let stack = build_stack(&configuration).await.unwrap();

        let value = admin::execute(&Command::Demo, &stack).await.unwrap();
        assert_eq!(value["provider"], provider);
        assert_eq!(value["transfer"]["outcome"], "success");
        assert_eq!(value["transfer"]["fromBalance"], "900.00");
        assert_eq!(value["transfer"]["toBalance"], "600.00");
        assert_eq!(value["withdrawal"]["outcome"], "failure");
        assert_eq!(value["withdrawal"]["kind"], "insufficient_funds");
        assert_eq!(value["closing"]["target"], "600.00");
        assert_eq!(value["closing"]["total"], "1500.00");

        // every lock taken by the scenario was released
        let status = admin::execute(&Command::Status, &stack).await.unwrap();
        for state in status["status"]["providers"].as_array().unwrap() {
            assert_eq!(state["localLocks"], 0);
        }
    }
}

#[tokio::test]
async fn test_switch_requires_available_target() {
    let file = config_file("cache");
    let configuration = Configuration::load(&file.path().to_string_lossy(), None, None).unwrap();
    let stack = build_stack(&configuration).await.unwrap();

    let to_cache = Command::Switch {
        provider: "cache".to_string(),
    };
    let value = admin::execute(&to_cache, &stack).await.unwrap();
    assert_eq!(value["switched"], true);

    stack.coordination.set_available(false);
    let to_coordination = Command::Switch {
        provider: "coordination-service".to_string(),
    };
    let value = admin::execute(&to_coordination, &stack).await.unwrap();
    assert_eq!(value["switched"], false);
    assert_eq!(value["status"]["currentProvider"], "cache");

    let available = Command::Available {
        provider: "coordination-service".to_string(),
    };
    let value = admin::execute(&available, &stack).await.unwrap();
    assert_eq!(value["available"], false);
}
