#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use serde_json::{json, Value};
    use serial_test::serial;

    use crate::api::{LoginResponse, UserData};
    use crate::test::utils::{
        create_standard_test_db, login_test_user, setup_test_client, TestDbBuilder,
        STANDARD_PASSWORD,
    };

    #[rocket::async_test]
    #[serial]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "member_user",
                    "password": STANDARD_PASSWORD
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(login_response.success);
        assert_eq!(login_response.user.unwrap().username, "member_user");

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "member_user",
                    "password": "wrong_password"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let login_response: LoginResponse = serde_json::from_str(&body).unwrap();

        assert!(!login_response.success);
        assert!(login_response.error.is_some());
    }

    #[rocket::async_test]
    #[serial]
    async fn test_auth_required_apis() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let endpoints = vec![
            "/api/me",
            "/api/plans",
            "/api/plans/active",
            "/api/leaderboard",
            "/api/leaderboard/me",
            "/api/users/1/rank",
        ];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }
    }

    #[rocket::async_test]
    #[serial]
    async fn test_me_api() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.unwrap();
        let user_data: UserData = serde_json::from_str(&body).unwrap();

        assert_eq!(user_data.username, "member_user");
        assert_eq!(user_data.display_name, "Member User");
        assert_eq!(user_data.role, "member");
    }

    #[rocket::async_test]
    #[serial]
    async fn test_register_member_then_login() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let client = setup_test_client(&test_db).await;

        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "fresh_member",
                    "display_name": "Fresh Member",
                    "password": "longenough"
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);

        // Duplicate usernames are rejected.
        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "fresh_member",
                    "display_name": "Fresh Member",
                    "password": "longenough"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        // Unauthenticated callers cannot create doctor accounts.
        let response = client
            .post("/api/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": "sneaky_doctor",
                    "display_name": "Sneaky",
                    "password": "longenough",
                    "role": "doctor"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        login_test_user(&client, "fresh_member", "longenough").await;

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_logout_ends_session() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;
        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_doctor_creates_plan_for_patient() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let patient_id = test_db.user_id("member_user");
        let doctor_id = test_db.user_id("doctor_user");

        let body = json!({
            "cigarettes_per_day": 20,
            "cigarettes_per_pack": 20,
            "price_per_pack": 30000,
            "years_smoked": 5,
            "patient_id": patient_id
        })
        .to_string();

        // Members cannot create plans on someone else's behalf.
        login_test_user(&client, "other_member", STANDARD_PASSWORD).await;
        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        login_test_user(&client, "doctor_user", STANDARD_PASSWORD).await;
        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let plan: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(plan["user_id"], patient_id);
        assert_eq!(plan["doctor_id"], doctor_id);
        assert_eq!(plan["source"], "doctor");

        // The patient now has an active plan, so a second recommendation
        // conflicts just like a self-created duplicate would.
        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        // The plan belongs to the patient, not the doctor.
        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;
        let response = client.get("/api/plans/active").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let active: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(active["id"], plan["id"]);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_record_progress_over_http() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(
                json!({
                    "cigarettes_per_day": 20,
                    "cigarettes_per_pack": 20,
                    "price_per_pack": 30000,
                    "years_smoked": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // A smoke-free day cannot report smoked cigarettes.
        let response = client
            .post("/api/progress")
            .header(ContentType::JSON)
            .body(json!({ "smoked_today": false, "cigarettes_smoked": 3 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let errors: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(errors["errors"].get("cigarettes_smoked").is_some());

        let response = client
            .post("/api/progress")
            .header(ContentType::JSON)
            .body(
                json!({
                    "smoked_today": true,
                    "cigarettes_smoked": 5,
                    "mood": "stressed",
                    "note": "rough day at work"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // A smoked day zeroes the streak and saves nothing, but the
        // mood and note are kept.
        let record: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(record["smoked_today"], true);
        assert_eq!(record["cigarettes_smoked"], 5);
        assert_eq!(record["days_smoke_free"], 0);
        assert_eq!(record["money_saved"], 0);
        assert_eq!(record["mood"], "stressed");
        assert_eq!(record["note"], "rough day at work");
    }

    #[rocket::async_test]
    #[serial]
    async fn test_plan_lifecycle_over_http() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        // No plan yet.
        let response = client.get("/api/plans/active").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let create_body = json!({
            "cigarettes_per_day": 20,
            "cigarettes_per_pack": 20,
            "price_per_pack": 30000,
            "years_smoked": 5
        })
        .to_string();

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&create_body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let plan: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(plan["status"], "active");
        assert_eq!(plan["daily_cost"], 30000);

        // A second create without reset conflicts.
        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&create_body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);

        let response = client.post("/api/plans/reset").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let reset: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(reset["cancelled_plan_id"], plan["id"]);

        // Reset again with nothing active.
        let response = client.post("/api/plans/reset").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        // Create succeeds again after the reset.
        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(&create_body)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/plans").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let plans: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(plans.as_array().unwrap().len(), 2);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_validation_rejects_bad_baseline() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(
                json!({
                    "cigarettes_per_day": 0,
                    "cigarettes_per_pack": 20,
                    "price_per_pack": -5,
                    "years_smoked": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(body["errors"].get("cigarettes_per_day").is_some());
        assert!(body["errors"].get("price_per_pack").is_some());
    }

    #[rocket::async_test]
    #[serial]
    async fn test_smoke_free_day_and_stats_over_http() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        // Tracking requires an active plan.
        let response = client.post("/api/progress/smoke-free").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(
                json!({
                    "cigarettes_per_day": 20,
                    "cigarettes_per_pack": 20,
                    "price_per_pack": 30000,
                    "years_smoked": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let plan: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        let response = client.post("/api/progress/smoke-free").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let record: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(record["days_smoke_free"], 1);
        assert_eq!(record["money_saved"], 30000);

        // Same-day repeat upserts rather than duplicating or failing.
        let response = client.post("/api/progress/smoke-free").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let repeat: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(repeat["id"], record["id"]);
        assert_eq!(repeat["days_smoke_free"], 1);

        let response = client
            .get(format!("/api/plans/{}/stats", plan["id"]))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let stats: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(stats["days_smoke_free"], 1);
        assert_eq!(stats["total_money_saved"], 30000);
        assert_eq!(stats["smoke_free_day_count"], 1);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_leaderboard_over_http() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(
                json!({
                    "cigarettes_per_day": 20,
                    "cigarettes_per_pack": 20,
                    "price_per_pack": 30000,
                    "years_smoked": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.post("/api/progress/smoke-free").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/leaderboard").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let board: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let entries = board.as_array().unwrap();

        // Both members are ranked, tracking member first.
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["full_name"], "Member User");
        assert_eq!(entries[0]["rank"], 1);
        assert_eq!(entries[1]["rank"], 2);
        assert_eq!(entries[1]["points"], 0);

        let response = client.get("/api/leaderboard/me?limit=1").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let combined: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(combined["leaderboard"].as_array().unwrap().len(), 1);
        assert_eq!(combined["current_user_rank"]["rank"], 1);

        let other_id = test_db.user_id("other_member");
        let response = client
            .get(format!("/api/users/{}/rank", other_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let entry: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(entry["rank"], 2);

        // Doctors and unknown ids produce no ranking entry.
        let doctor_id = test_db.user_id("doctor_user");
        let response = client
            .get(format!("/api/users/{}/rank", doctor_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_patient_roster_requires_doctor() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;
        let response = client.get("/api/patients").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);

        login_test_user(&client, "doctor_user", STANDARD_PASSWORD).await;
        let response = client.get("/api/patients").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let roster: Vec<UserData> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let mut usernames: Vec<_> = roster.iter().map(|u| u.username.as_str()).collect();
        usernames.sort();
        assert_eq!(usernames, vec!["member_user", "other_member"]);
    }

    #[rocket::async_test]
    #[serial]
    async fn test_doctor_approval_over_http() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        login_test_user(&client, "member_user", STANDARD_PASSWORD).await;

        let response = client
            .post("/api/plans")
            .header(ContentType::JSON)
            .body(
                json!({
                    "cigarettes_per_day": 10,
                    "cigarettes_per_pack": 20,
                    "price_per_pack": 30000,
                    "years_smoked": 3
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let plan: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();

        // Members cannot approve their own plans.
        let response = client
            .put(format!("/api/plans/{}/approve", plan["id"]))
            .header(ContentType::JSON)
            .body(json!({ "notes": "self-approved" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        login_test_user(&client, "doctor_user", STANDARD_PASSWORD).await;

        let response = client
            .put(format!("/api/plans/{}/approve", plan["id"]))
            .header(ContentType::JSON)
            .body(json!({ "notes": "Good pacing" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let approved: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(approved["approved_by_doctor"], true);
        assert_eq!(approved["doctor_notes"], "Good pacing");
        assert_eq!(approved["status"], "active");
    }

    #[rocket::async_test]
    #[serial]
    async fn test_health_api() {
        let test_db = create_standard_test_db().await;
        let client = setup_test_client(&test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
