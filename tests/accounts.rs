mod common;

use common::*;
use storefront::auth::JwtKeys;
use storefront::domain::aggregates::Role;
use storefront::error::AppError;
use storefront::services::{AccountService, NewAddress};

fn accounts(h: &Harness) -> (AccountService, JwtKeys) {
    let jwt = JwtKeys::new("test-jwt-secret", 1);
    (AccountService::new(h.store(), jwt.clone(), h.config.admin_emails.clone()), jwt)
}

fn address(city: &str, is_default: bool) -> NewAddress {
    NewAddress {
        full_name: "Asha Rao".into(),
        phone: "9999999999".into(),
        line1: "12 Park Street".into(),
        line2: None,
        city: city.into(),
        state: "MH".into(),
        postal_code: "411001".into(),
        country: "IN".into(),
        is_default,
    }
}

#[tokio::test]
async fn test_register_then_login() {
    let h = Harness::new();
    let (service, jwt) = accounts(&h);

    let registered = service.register("Asha", "Asha@Example.com", "hunter22".into()).await.unwrap();
    assert_eq!(registered.user.email, "asha@example.com");
    assert_eq!(registered.user.role, Role::User);
    assert_eq!(jwt.verify(&registered.token).unwrap().sub, registered.user.id);

    let logged_in = service.login("asha@example.com", "hunter22".into()).await.unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);

    for (email, password) in [("asha@example.com", "wrong"), ("nobody@example.com", "hunter22"), ("not-an-email", "x")] {
        let err = service.login(email, password.into()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)), "{email}");
    }
}

#[tokio::test]
async fn test_listed_emails_register_as_admin() {
    let h = Harness::new();
    let (service, jwt) = accounts(&h);
    let admin = service.register("Owner", "admin@shop.test", "hunter22".into()).await.unwrap();
    assert_eq!(admin.user.role, Role::Admin);
    assert_eq!(jwt.verify(&admin.token).unwrap().role, Role::Admin);
}

#[tokio::test]
async fn test_duplicate_and_malformed_registrations() {
    let h = Harness::new();
    let (service, _) = accounts(&h);
    service.register("Asha", "asha@example.com", "hunter22".into()).await.unwrap();

    let err = service.register("Other", "ASHA@example.com", "hunter22".into()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = service.register("Other", "nope", "hunter22".into()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_address_book_keeps_a_single_default() {
    let h = Harness::new();
    let (service, _) = accounts(&h);
    let user = seed_user(h.store.as_ref(), "Asha", "asha@example.com").await;

    let book = service.add_address(user.id(), address("Pune", false)).await.unwrap();
    assert!(book[0].is_default);

    let book = service.add_address(user.id(), address("Mumbai", true)).await.unwrap();
    assert_eq!(book.iter().filter(|a| a.is_default).count(), 1);
    assert_eq!(book.iter().find(|a| a.is_default).unwrap().city, "Mumbai");

    let pune = book.iter().find(|a| a.city == "Pune").unwrap().id;
    let book = service.set_default(user.id(), pune).await.unwrap();
    assert_eq!(book.iter().filter(|a| a.is_default).count(), 1);
    assert!(book.iter().find(|a| a.id == pune).unwrap().is_default);

    let book = service.remove_address(user.id(), pune).await.unwrap();
    assert_eq!(book.len(), 1);
    assert_eq!(service.addresses(user.id()).await.unwrap().len(), 1);

    let err = service.set_default(user.id(), uuid::Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_profile_of_unknown_user_is_not_found() {
    let h = Harness::new();
    let (service, _) = accounts(&h);
    assert!(matches!(service.profile(uuid::Uuid::now_v7()).await, Err(AppError::NotFound(_))));
}
