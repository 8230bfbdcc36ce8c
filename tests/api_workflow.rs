//! End-to-end tests of the HTTP API.
//!
//! Each test builds the full router on a throwaway SQLite database and drives
//! it with `oneshot`, going through authentication, policy, lifecycle and
//! export exactly as a client would.

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use registro_solicitudes::api::build_router;
use registro_solicitudes::config::Settings;
use registro_solicitudes::server;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    _dir: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

async fn setup_with(configure: impl FnOnce(&mut Settings)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.database.path = dir.path().join("registro.db");
    configure(&mut settings);

    let state = server::bootstrap(&settings).await.unwrap();
    server::create_user(&state, "ana", "ana@example.com", "clave-ana", false, false)
        .await
        .unwrap();
    server::create_user(&state, "beto", "beto@example.com", "clave-beto", false, false)
        .await
        .unwrap();
    server::create_user(&state, "rita", "rita@example.com", "clave-rita", false, true)
        .await
        .unwrap();
    server::create_user(&state, "admin", "admin@example.com", "clave-admin", true, false)
        .await
        .unwrap();

    TestApp {
        router: build_router(state, &settings.server.cors_allowed_origins),
        _dir: dir,
    }
}

async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn login(&self, username: &str) -> String {
        let response = self
            .send(
                Method::POST,
                "/api/v1/login/",
                None,
                Some(json!({ "username": username, "password": format!("clave-{}", username) })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login as {}", username);
        response.json()["token"].as_str().unwrap().to_string()
    }

    async fn create_solicitud(&self, token: &str, titulo: &str) -> i64 {
        let response = self
            .send(
                Method::POST,
                "/api/v1/solicitudes/",
                Some(token),
                Some(json!({ "titulo": titulo, "resumen": "Resumen", "tipo_trabajo": "ART" })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        response.json()["id"].as_i64().unwrap()
    }

    async fn review(&self, token: &str, id: i64, recomendacion: &str) -> TestResponse {
        self.send(
            Method::POST,
            &format!("/api/v1/solicitudes/{}/add_revision/", id),
            Some(token),
            Some(json!({ "recomendacion": recomendacion, "comentarios": "Revisado" })),
        )
        .await
    }

    async fn estado(&self, token: &str, id: i64) -> String {
        let response = self
            .send(Method::GET, &format!("/api/v1/solicitudes/{}/", id), Some(token), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        response.json()["estado"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn login_and_user_info() {
    let app = setup().await;
    let token = app.login("admin").await;

    let response = app.send(Method::GET, "/api/v1/user/info/", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let info = response.json();
    assert_eq!(info["username"], "admin");
    assert_eq!(info["is_staff"], true);
    assert_eq!(info["email"], "admin@example.com");
    assert!(info["id"].is_i64());

    // Same token on every login.
    assert_eq!(app.login("admin").await, token);
}

#[tokio::test]
async fn bad_credentials_and_tokens() {
    let app = setup().await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/login/",
            None,
            Some(json!({ "username": "ana", "password": "incorrecta" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json(),
        json!({ "non_field_errors": ["Unable to log in with provided credentials."] })
    );

    let response = app
        .send(Method::POST, "/api/v1/login/", None, Some(json!({ "username": "ana" })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["password"], json!(["This field is required."]));

    let response = app.send(Method::GET, "/api/v1/solicitudes/", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.json()["detail"],
        "Authentication credentials were not provided."
    );

    let response = app
        .send(Method::GET, "/api/v1/solicitudes/", Some("desconocido"), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["detail"], "Invalid token.");
}

#[tokio::test]
async fn repeated_login_failures_are_throttled() {
    let app = setup().await;
    let wrong = json!({ "username": "beto", "password": "nope" });

    for _ in 0..4 {
        let response = app
            .send(Method::POST, "/api/v1/login/", None, Some(wrong.clone()))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }
    let response = app
        .send(Method::POST, "/api/v1/login/", None, Some(wrong.clone()))
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Other accounts can still log in.
    app.login("ana").await;
}

#[tokio::test]
async fn create_ignores_read_only_fields() {
    let app = setup().await;
    let ana = app.login("ana").await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/solicitudes/",
            Some(&ana),
            Some(json!({
                "titulo": "Mi tesis",
                "resumen": "Resumen",
                "tipo_trabajo": "TES_G",
                "estado": "aprobada",
                "solicitante": "admin",
                "fecha_creacion": "2000-01-01T00:00:00Z",
                "revisiones": [{ "recomendacion": "APR" }],
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["estado"], "pendiente");
    assert_eq!(body["solicitante"], "ana");
    assert_eq!(body["tipo_trabajo"], "TES_G");
    assert_ne!(body["fecha_creacion"], "2000-01-01T00:00:00Z");
    assert_eq!(body["revisiones"], json!([]));
}

#[tokio::test]
async fn create_reports_field_errors() {
    let app = setup().await;
    let ana = app.login("ana").await;

    let response = app
        .send(
            Method::POST,
            "/api/v1/solicitudes/",
            Some(&ana),
            Some(json!({ "titulo": "", "tipo_trabajo": "LIBRO" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json(),
        json!({
            "titulo": ["This field may not be blank."],
            "resumen": ["This field is required."],
            "tipo_trabajo": ["\"LIBRO\" is not a valid choice."],
        })
    );
}

#[tokio::test]
async fn recommendation_drives_status() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&ana, "Tesis").await;

    for (code, expected) in [
        ("RMEN", "en_revision"),
        ("APR", "aprobada"),
        ("RMAY", "en_revision"),
        ("RECH", "rechazada"),
    ] {
        let response = app.review(&admin, id, code).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(app.estado(&ana, id).await, expected, "after {}", code);
    }

    let response = app
        .send(Method::GET, &format!("/api/v1/solicitudes/{}/", id), Some(&ana), None)
        .await;
    let revisiones = response.json()["revisiones"].as_array().unwrap().clone();
    assert_eq!(revisiones.len(), 4);
    assert_eq!(revisiones[0]["recomendacion"], "RECH");
    assert_eq!(revisiones[0]["revisor"], "admin");
    assert!(revisiones[0].get("solicitud").is_none());
}

#[tokio::test]
async fn review_reference_and_reviewer_come_from_server() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let admin = app.login("admin").await;
    let target = app.create_solicitud(&ana, "Destino").await;
    let other = app.create_solicitud(&ana, "Otra").await;

    let response = app
        .send(
            Method::POST,
            &format!("/api/v1/solicitudes/{}/add_revision/", target),
            Some(&admin),
            Some(json!({ "recomendacion": "APR", "solicitud": other, "revisor": "ana" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let revision = response.json();
    assert_eq!(revision["solicitud"], target);
    assert_eq!(revision["revisor"], "admin");
    assert_eq!(revision["recomendacion"], "APR");
    assert_eq!(app.estado(&ana, other).await, "pendiente");
}

#[tokio::test]
async fn review_requires_capability() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let id = app.create_solicitud(&ana, "Tesis").await;

    let response = app.review(&ana, id, "APR").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.json()["detail"],
        "You do not have permission to perform this action."
    );
    assert_eq!(app.estado(&ana, id).await, "pendiente");

    let response = app
        .send(
            Method::POST,
            &format!("/api/v1/solicitudes/{}/add_revision/", id),
            Some(&app.login("admin").await),
            Some(json!({ "recomendacion": "QUIZAS" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["recomendacion"],
        json!(["\"QUIZAS\" is not a valid choice."])
    );
}

#[tokio::test]
async fn non_owners_cannot_touch_foreign_solicitudes() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let beto = app.login("beto").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&ana, "Privada").await;
    let uri = format!("/api/v1/solicitudes/{}/", id);
    let full = json!({ "titulo": "Robada", "resumen": "x", "tipo_trabajo": "ART" });

    assert_eq!(
        app.send(Method::GET, &uri, Some(&beto), None).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.send(Method::PUT, &uri, Some(&beto), Some(full.clone())).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.send(Method::DELETE, &uri, Some(&beto), None).await.status,
        StatusCode::NOT_FOUND
    );

    // Staff can read but not write.
    assert_eq!(
        app.send(Method::GET, &uri, Some(&admin), None).await.status,
        StatusCode::OK
    );
    assert_eq!(
        app.send(Method::PATCH, &uri, Some(&admin), Some(json!({ "titulo": "x" })))
            .await
            .status,
        StatusCode::FORBIDDEN
    );

    let response = app.send(Method::GET, &uri, Some(&ana), None).await;
    assert_eq!(response.json()["titulo"], "Privada");
}

#[tokio::test]
async fn owner_updates_and_deletes() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let id = app.create_solicitud(&ana, "Borrador").await;
    let uri = format!("/api/v1/solicitudes/{}/", id);

    let response = app
        .send(
            Method::PATCH,
            &uri,
            Some(&ana),
            Some(json!({ "resumen": "Nuevo resumen", "estado": "aprobada" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["resumen"], "Nuevo resumen");
    assert_eq!(body["titulo"], "Borrador");
    assert_eq!(body["estado"], "pendiente");

    let response = app
        .send(Method::PUT, &uri, Some(&ana), Some(json!({ "titulo": "Final" })))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .send(
            Method::PUT,
            &uri,
            Some(&ana),
            Some(json!({ "titulo": "Final", "resumen": "R", "tipo_trabajo": "TES_P" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["tipo_trabajo"], "TES_P");

    let response = app.send(Method::DELETE, &uri, Some(&ana), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.send(Method::GET, &uri, Some(&ana), None).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn listings_are_scoped_and_newest_first() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let beto = app.login("beto").await;
    let admin = app.login("admin").await;

    let first = app.create_solicitud(&ana, "Primera").await;
    let second = app.create_solicitud(&beto, "Segunda").await;
    let third = app.create_solicitud(&ana, "Tercera").await;

    let ids = |response: TestResponse| -> Vec<i64> {
        response
            .json()
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_i64().unwrap())
            .collect()
    };

    let all = app.send(Method::GET, "/api/v1/solicitudes/", Some(&admin), None).await;
    assert_eq!(ids(all), vec![third, second, first]);

    let own = app.send(Method::GET, "/api/v1/solicitudes/", Some(&ana), None).await;
    assert_eq!(ids(own), vec![third, first]);

    let mine = app
        .send(Method::GET, "/api/v1/solicitudes/mis_solicitudes/", Some(&beto), None)
        .await;
    assert_eq!(ids(mine), vec![second]);

    let staff_own = app
        .send(Method::GET, "/api/v1/solicitudes/mis_solicitudes/", Some(&admin), None)
        .await;
    assert!(ids(staff_own).is_empty());
}

#[tokio::test]
async fn eliminar_finalizada_only_when_finalized() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&ana, "Tesis").await;
    let uri = format!("/api/v1/solicitudes/{}/eliminar_finalizada/", id);

    app.review(&admin, id, "RMAY").await;
    let response = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json()["detail"],
        "Solo se pueden eliminar solicitudes en estado \"aprobada\" o \"rechazada\"."
    );
    assert_eq!(app.estado(&ana, id).await, "en_revision");

    // The owner lacks the reviewer capability.
    app.review(&admin, id, "RECH").await;
    let response = app.send(Method::DELETE, &uri, Some(&ana), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.send(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.send(Method::GET, &format!("/api/v1/solicitudes/{}/", id), Some(&ana), None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );

    // Revisiones went with it.
    let response = app.send(Method::GET, "/api/v1/revisiones/", Some(&admin), None).await;
    assert_eq!(response.json(), json!([]));
}

#[tokio::test]
async fn revisiones_are_staff_only_and_read_only() {
    let app = setup().await;
    let rita = app.login("rita").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&rita, "Propia").await;

    let created = app.review(&rita, id, "RMEN").await;
    assert_eq!(created.status, StatusCode::CREATED);
    let revision_id = created.json()["id"].as_i64().unwrap();

    let response = app.send(Method::GET, "/api/v1/revisiones/", Some(&rita), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.send(Method::GET, "/api/v1/revisiones/", Some(&admin), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let listed = response.json();
    assert_eq!(listed[0]["solicitud"], id);
    assert_eq!(listed[0]["revisor"], "rita");

    let response = app
        .send(
            Method::GET,
            &format!("/api/v1/revisiones/{}/", revision_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(response.json()["comentarios"], "Revisado");

    let response = app
        .send(
            Method::POST,
            "/api/v1/revisiones/",
            Some(&admin),
            Some(json!({ "recomendacion": "APR" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn pdf_download_rules() {
    let app = setup().await;
    let ana = app.login("ana").await;
    let beto = app.login("beto").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&ana, "Redes neuronales profundas").await;
    let uri = |token: &str| format!("/api/v1/solicitudes/{}/descargar_pdf/?auth_token={}", id, token);

    // Pending: no document.
    let response = app.send(Method::GET, &uri(&ana), None, None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.text().contains("Estado actual: pendiente"));

    app.review(&admin, id, "RMEN").await;

    let response = app.send(Method::GET, &uri(&ana), None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"Solicitud_{}_Redes_neuronales_pro.pdf\"", id).as_str()
    );
    assert!(response.body.starts_with(b"%PDF"));

    // The Authorization header works too.
    let response = app
        .send(
            Method::GET,
            &format!("/api/v1/solicitudes/{}/descargar_pdf/", id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    // An empty query token falls back to the header.
    let response = app
        .send(
            Method::GET,
            &format!("/api/v1/solicitudes/{}/descargar_pdf/?auth_token=", id),
            Some(&ana),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.starts_with(b"%PDF"));

    // Unknown or missing tokens are anonymous.
    let response = app.send(Method::GET, &uri("desconocido"), None, None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "No autorizado.");
    let response = app
        .send(
            Method::GET,
            &format!("/api/v1/solicitudes/{}/descargar_pdf/", id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    // Other users' solicitudes stay hidden.
    let response = app.send(Method::GET, &uri(&beto), None, None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finalized_review_guard_when_configured() {
    let app = setup_with(|settings| settings.lifecycle.allow_review_of_finalized = false).await;
    let ana = app.login("ana").await;
    let admin = app.login("admin").await;
    let id = app.create_solicitud(&ana, "Tesis").await;

    assert_eq!(app.review(&admin, id, "APR").await.status, StatusCode::CREATED);
    let response = app.review(&admin, id, "RECH").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.json()["detail"]
        .as_str()
        .unwrap()
        .contains("aprobada"));
    assert_eq!(app.estado(&ana, id).await, "aprobada");
}

#[tokio::test]
async fn unknown_paths_and_ids_are_not_found() {
    let app = setup().await;
    let ana = app.login("ana").await;

    let response = app
        .send(Method::GET, "/api/v1/solicitudes/abc/", Some(&ana), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.send(Method::GET, "/api/v1/nada/", Some(&ana), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["detail"], "Not found.");
}

#[tokio::test]
async fn cors_allows_credentials_for_configured_origins() {
    let app = setup_with(|settings| {
        settings.server.cors_allowed_origins = vec!["http://localhost:3000".to_string()];
    })
    .await;
    let token = app.login("ana").await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/user/info/")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::AUTHORIZATION, format!("Token {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/user/info/")
        .header(header::ORIGIN, "http://evil.example")
        .header(header::AUTHORIZATION, format!("Token {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
