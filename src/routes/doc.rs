use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{AuditLogEntry, AuditLogList, DashboardSummary},
        auth::{AdminAuthPayload, AuthPayload, LoginRequest, RegisterRequest},
        categories::{CategoryList, CategoryRequest},
        orders::{
            OrderDetail, OrderList, OrderWithItems, PlaceOrderItem, PlaceOrderRequest,
            UpdateOrderRequest,
        },
        products::{CreateProductRequest, ProductList, UpdateProductRequest, VariationInput},
        users::{CreateUserRequest, UpdateUserRequest, UserList},
    },
    middleware::auth::Role,
    models::{Admin, Category, Order, OrderItem, OrderItemDetail, Product, ProductVariation, User},
    response::{ApiResponse, ErrorResponse, Meta},
    routes::{admin, auth, categories, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        auth::logout,
        products::list_products,
        products::get_product,
        products::admin_list_products,
        products::admin_get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::delete_variation,
        orders::place_order,
        orders::list_orders,
        orders::get_order,
        orders::update_order,
        orders::delete_order,
        admin::login,
        admin::me,
        admin::logout,
        admin::dashboard,
        admin::list_audit_logs,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_admin,
        admin::delete_order_admin,
        categories::list_categories,
        categories::create_category,
        categories::get_category,
        categories::update_category,
        categories::delete_category,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user
    ),
    components(
        schemas(
            User,
            Admin,
            Role,
            Category,
            Product,
            ProductVariation,
            Order,
            OrderItem,
            OrderItemDetail,
            RegisterRequest,
            LoginRequest,
            AuthPayload,
            AdminAuthPayload,
            CategoryRequest,
            CategoryList,
            VariationInput,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            PlaceOrderItem,
            PlaceOrderRequest,
            UpdateOrderRequest,
            OrderWithItems,
            OrderDetail,
            OrderList,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            DashboardSummary,
            AuditLogEntry,
            AuditLogList,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            health::HealthData,
            Meta,
            ErrorResponse,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Customer registration and sessions"),
        (name = "Products", description = "Public catalog"),
        (name = "Orders", description = "Order placement and history"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_admin_product_routes_are_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/orders",
            "/api/orders/{id}",
            "/api/admin/orders",
            "/api/admin/orders/{id}",
            "/api/admin/products",
            "/api/admin/products/{id}",
            "/api/admin/products/{id}/variations/{variation_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
