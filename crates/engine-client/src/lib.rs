//! Docker Engine API client used to provision confidential workloads.

mod client;
mod error;
mod types;

pub use client::{split_image_reference, EngineClient};
pub use error::EngineError;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_from_endpoint_url() {
        assert!(EngineClient::from_endpoint_url("unix:///var/run/docker.sock").is_ok());
        assert!(EngineClient::from_endpoint_url("tcp://10.0.0.5:2375").is_ok());
        assert!(EngineClient::from_endpoint_url("http://10.0.0.5:2375").is_ok());
        assert!(matches!(
            EngineClient::from_endpoint_url("unix://"),
            Err(EngineError::UnsupportedEndpoint(_))
        ));
        assert!(matches!(
            EngineClient::from_endpoint_url("ssh://host"),
            Err(EngineError::UnsupportedEndpoint(_))
        ));
    }

    #[test]
    fn test_split_image_reference() {
        assert_eq!(split_image_reference("w:1"), ("w", Some("1")));
        assert_eq!(split_image_reference("nginx"), ("nginx", None));
        assert_eq!(
            split_image_reference("registry:5000/team/app:2.0"),
            ("registry:5000/team/app", Some("2.0"))
        );
        assert_eq!(
            split_image_reference("registry:5000/team/app"),
            ("registry:5000/team/app", None)
        );
        assert_eq!(
            split_image_reference("app@sha256:abcd"),
            ("app@sha256:abcd", None)
        );
    }

    #[tokio::test]
    async fn test_unix_socket_missing() {
        let client = EngineClient::unix("/nonexistent/docker.sock");
        let result = client.inspect_image("w:1").await;
        assert!(matches!(result, Err(EngineError::SocketNotFound(_))));
    }

    #[tokio::test]
    async fn test_pull_and_inspect_image() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/images/create"))
            .and(query_param("fromImage", "w"))
            .and(query_param("tag", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"status\":\"Pulling from library/w\"}\n{\"status\":\"Download complete\"}\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/images/w:1/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Id": "sha256:1234",
                "Config": {
                    "Labels": {
                        "pcc.mrenclave": "aa",
                        "pcc.mrsigner": "bb"
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        client.pull_image("w:1").await.unwrap();

        let image = client.inspect_image("w:1").await.unwrap();
        let labels = image.labels();
        assert_eq!(labels["pcc.mrenclave"], "aa");
        assert_eq!(labels["pcc.mrsigner"], "bb");
    }

    #[tokio::test]
    async fn test_pull_untagged_image_defaults_to_latest() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/images/create"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        client.pull_image("nginx").await.unwrap();
        client.pull_image("app@sha256:abcd").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let queries: Vec<_> = requests
            .iter()
            .map(|r| {
                r.url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect::<Vec<_>>()
            })
            .collect();

        assert_eq!(
            queries[0],
            vec![
                ("fromImage".to_string(), "nginx".to_string()),
                ("tag".to_string(), "latest".to_string())
            ]
        );
        assert_eq!(
            queries[1],
            vec![("fromImage".to_string(), "app@sha256:abcd".to_string())]
        );
    }

    #[tokio::test]
    async fn test_pull_reports_inline_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/images/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{\"error\":\"manifest unknown\"}\n"),
            )
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        let result = client.pull_image("missing:latest").await;
        match result {
            Err(EngineError::Api { message, .. }) => assert_eq!(message, "manifest unknown"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inspect_image_without_labels() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/images/plain/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Id": "sha256:1234",
                "Config": { "Labels": null }
            })))
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        let image = client.inspect_image("plain").await.unwrap();
        assert!(image.labels().is_empty());
    }

    #[tokio::test]
    async fn test_inspect_volume_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/volumes/data"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "no such volume"})),
            )
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        let err = client.inspect_volume("data").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no such volume"));
    }

    #[tokio::test]
    async fn test_create_start_and_networks() {
        let server = MockServer::start().await;

        let body = ContainerCreateBody {
            image: "w:1".into(),
            env: vec!["EDG_MARBLE_TYPE=app_marble".into()],
            host_config: HostConfig {
                publish_all_ports: true,
                ..Default::default()
            },
            ..Default::default()
        };

        Mock::given(method("POST"))
            .and(path("/containers/create"))
            .and(query_param("name", "app"))
            .and(body_json(serde_json::json!({
                "Image": "w:1",
                "Env": ["EDG_MARBLE_TYPE=app_marble"],
                "HostConfig": { "PublishAllPorts": true }
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"Id": "c0ffee"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/networks/coordinator/connect"))
            .and(body_json(serde_json::json!({"Container": "c0ffee"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/containers/c0ffee/start"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/networks/bridge/disconnect"))
            .and(body_json(serde_json::json!({"Container": "c0ffee", "Force": false})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::tcp(server.uri());
        let created = client.create_container("app", &body).await.unwrap();
        assert_eq!(created.id, "c0ffee");
        client.connect_network("coordinator", &created.id).await.unwrap();
        client.start_container(&created.id).await.unwrap();
        client
            .disconnect_network("bridge", &created.id, false)
            .await
            .unwrap();
    }

    #[test]
    fn test_create_body_serialization() {
        let mut body = ContainerCreateBody {
            image: "w:1".into(),
            ..Default::default()
        };
        body.exposed_ports.insert("8080/tcp".into(), EmptyObject {});
        body.host_config.port_bindings.insert(
            "8080/tcp".into(),
            vec![PortBinding {
                host_ip: String::new(),
                host_port: "9090".into(),
            }],
        );
        body.host_config.mounts.push(Mount {
            mount_type: "volume".into(),
            source: "data".into(),
            target: "/data".into(),
        });

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ExposedPorts"]["8080/tcp"], serde_json::json!({}));
        assert_eq!(
            json["HostConfig"]["PortBindings"]["8080/tcp"][0]["HostPort"],
            "9090"
        );
        assert_eq!(json["HostConfig"]["Mounts"][0]["Type"], "volume");
        assert!(json.get("Domainname").is_none());
    }
}
