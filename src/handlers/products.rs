use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::application::inventory::InventoryService;
use crate::domain::secret::SecretImport;
use crate::domain::stock::StockLevel;
use crate::errors::AppError;
use crate::infrastructure::inventory_repo::DieselInventoryRepository;

type Inventory = web::Data<InventoryService<DieselInventoryRepository>>;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportSecretsRequest {
    pub sku_id: Option<Uuid>,
    /// One secret per entry; blanks and duplicates are skipped.
    pub secrets: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportSecretsResponse {
    pub imported: usize,
    pub available: i64,
}

impl From<SecretImport> for ImportSecretsResponse {
    fn from(i: SecretImport) -> Self {
        ImportSecretsResponse {
            imported: i.imported,
            available: i.available,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockParams {
    /// Read a SKU's stock instead of the product's.
    pub sku_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockResponse {
    pub product_id: Uuid,
    pub sku_id: Option<Uuid>,
    pub fulfillment_type: String,
    /// `null` when stock is unlimited.
    pub available: Option<i64>,
}

impl From<StockLevel> for StockResponse {
    fn from(s: StockLevel) -> Self {
        StockResponse {
            product_id: s.product_id,
            sku_id: s.sku_id,
            fulfillment_type: s.fulfillment_type.as_str().to_string(),
            available: s.available,
        }
    }
}

/// POST /products/{product_id}/secrets
///
/// Operator import of card secrets for an auto-delivered product.
#[utoipa::path(
    post,
    path = "/products/{product_id}/secrets",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
    ),
    request_body = ImportSecretsRequest,
    responses(
        (status = 201, description = "Batch loaded", body = ImportSecretsResponse),
        (status = 400, description = "Empty batch or manual product"),
        (status = 404, description = "Product or SKU not found"),
    ),
    tag = "products"
)]
pub async fn import_secrets(
    inventory: Inventory,
    path: web::Path<Uuid>,
    body: web::Json<ImportSecretsRequest>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let ImportSecretsRequest { sku_id, secrets } = body.into_inner();

    let result = web::block(move || inventory.import_secrets(product_id, sku_id, secrets))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(ImportSecretsResponse::from(result)))
}

/// GET /products/{product_id}/stock
#[utoipa::path(
    get,
    path = "/products/{product_id}/stock",
    params(
        ("product_id" = Uuid, Path, description = "Product UUID"),
        StockParams,
    ),
    responses(
        (status = 200, description = "Sellable quantity", body = StockResponse),
        (status = 404, description = "Product or SKU not found"),
    ),
    tag = "products"
)]
pub async fn get_stock(
    inventory: Inventory,
    path: web::Path<Uuid>,
    params: web::Query<StockParams>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let sku_id = params.into_inner().sku_id;

    let level = web::block(move || inventory.stock_level(product_id, sku_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(StockResponse::from(level)))
}
