// src/handlers/factory.rs
// DOCUMENTATION: Generic CRUD handlers shared by every resource
// PURPOSE: One implementation of list/get/create/update/delete, parameterized
// by a `Resource`; routes pick the resource with a turbofish, e.g.
// `web::get().to(get_all::<TourRepository>)`

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db::{ApiFeatures, Resource};
use crate::errors::AppError;

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::InternalError(e.to_string()))
}

/// `{status, results, data: {data: [...]}}` with field projection applied
pub fn list_response<T: Serialize>(
    docs: &[T],
    features: &ApiFeatures,
) -> Result<HttpResponse, AppError> {
    let data = docs
        .iter()
        .map(|doc| to_json(doc).map(|v| features.project(v)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "results": data.len(),
        "data": { "data": data },
    })))
}

/// `{status, data: {data}}`
pub fn doc_response<T: Serialize>(doc: &T) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "success",
        "data": { "data": doc },
    }))
}

/// Query string as ordered key/value pairs, plus an equality filter for every
/// nested parent parameter (`{tourId}` filters on `tour`)
pub fn features_from_request(
    req: &HttpRequest,
    query: &[(String, String)],
) -> Result<ApiFeatures, AppError> {
    let mut features = ApiFeatures::from_pairs(query)?;
    for (key, value) in req.match_info().iter() {
        if let Some(parent) = key.strip_suffix("Id") {
            features = features.with_filter(parent, value);
        }
    }
    Ok(features)
}

pub async fn get_all<R: Resource>(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, AppError> {
    let features = features_from_request(&req, &query)?;
    let docs = R::find_all(pool.get_ref(), &features).await?;
    log::debug!("Listed {} {}(s)", docs.len(), R::NAME);
    list_response(&docs, &features)
}

pub async fn get_one<R: Resource>(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let doc = R::find_one(pool.get_ref(), path.into_inner()).await?;
    Ok(doc_response(&doc))
}

pub async fn create_one<R: Resource>(
    pool: web::Data<PgPool>,
    body: web::Json<R::Create>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let doc = R::create(pool.get_ref(), body).await?;
    Ok(HttpResponse::Created().json(json!({
        "status": "success",
        "data": { "data": doc },
    })))
}

pub async fn update_one<R: Resource>(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<R::Update>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    let doc = R::update(pool.get_ref(), path.into_inner(), body).await?;
    Ok(doc_response(&doc))
}

pub async fn delete_one<R: Resource>(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    R::delete(pool.get_ref(), id).await?;
    log::info!("Deleted {} {}", R::NAME, id);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::test::TestRequest;

    #[actix_rt::test]
    async fn test_list_envelope_and_projection() {
        let docs = vec![
            json!({ "id": "1", "name": "The Forest Hiker", "price": 397 }),
            json!({ "id": "2", "name": "The Sea Explorer", "price": 497 }),
        ];
        let features =
            ApiFeatures::from_pairs(&[("fields".to_string(), "name".to_string())]).unwrap();

        let resp = list_response(&docs, &features).unwrap();
        assert_eq!(resp.status(), 200);

        let bytes = to_bytes(resp.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["data"][0]["name"], "The Forest Hiker");
        assert!(body["data"]["data"][0].get("price").is_none());
        assert_eq!(body["data"]["data"][1]["id"], "2");
    }

    #[test]
    fn test_nested_param_becomes_filter() {
        let tour_id = Uuid::new_v4().to_string();
        let req = TestRequest::default()
            .param("tourId", tour_id.clone())
            .to_http_request();

        let features = features_from_request(&req, &[]).unwrap();
        assert_eq!(features.filters.len(), 1);
        assert_eq!(features.filters[0].field, "tour");
        assert_eq!(features.filters[0].values, vec![tour_id]);
    }

    #[test]
    fn test_plain_id_param_is_not_a_filter() {
        let req = TestRequest::default()
            .param("id", Uuid::new_v4().to_string())
            .to_http_request();
        let features = features_from_request(&req, &[]).unwrap();
        assert!(features.filters.is_empty());
    }
}
