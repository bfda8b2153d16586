use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountStatus, AddressId, MessageId, OrderId, ProductId, QuestionId, Session, UserId,
};

/// One page of results from any paginated lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> SearchPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

impl<T> Default for SearchPage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(rename = "fName", default)]
    pub first_name: String,
    #[serde(rename = "lName", default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(rename = "phoneNumber", default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl UserRecord {
    /// A record without a status tag becomes an unrecognized status so the
    /// gate routes it to sign-in.
    pub fn into_session(self) -> Session {
        Session {
            id: self.id,
            email: self.email,
            status: self
                .status
                .unwrap_or_else(|| AccountStatus::Unrecognized(String::new())),
            first_name: self.first_name,
            last_name: self.last_name,
            photo: self.photo,
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    #[serde(rename = "fName")]
    pub first_name: String,
    #[serde(rename = "lName")]
    pub last_name: String,
    pub email: String,
    pub uid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserResponse {
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(rename = "insertedId", default, skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<UserId>,
    #[serde(default)]
    pub success: bool,
}

impl CreateUserResponse {
    pub fn is_created(&self) -> bool {
        self.acknowledged || self.success || self.inserted_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub photo: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtResponse {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSearchResponse {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl From<ProductSearchResponse> for SearchPage<Product> {
    fn from(value: ProductSearchResponse) -> Self {
        let total = value.total.unwrap_or(value.products.len() as u64);
        Self {
            items: value.products,
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    #[serde(rename = "_id")]
    pub id: ProductId,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    #[serde(rename = "paymentMethod", default)]
    pub payment_method: String,
    #[serde(rename = "orderStatus", default)]
    pub order_status: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(default)]
    pub total: f64,
    #[serde(rename = "productsInfo", default)]
    pub products_info: Vec<OrderProduct>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    #[serde(default)]
    pub data: Vec<Order>,
    #[serde(default)]
    pub total: i64,
}

impl From<OrderListResponse> for SearchPage<Order> {
    fn from(value: OrderListResponse) -> Self {
        Self {
            items: value.data,
            total: value.total.unsigned_abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// `MM/DD/YYYY`, as written by the admin console.
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: Option<QuestionAnswer>,
}

impl Question {
    pub fn is_answered(&self) -> bool {
        self.answer
            .as_ref()
            .and_then(|answer| answer.answer.as_deref())
            .is_some_and(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "_id")]
    pub id: AddressId,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub title: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub product_id: ProductId,
    pub title: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&Product> for WishlistItem {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            title: product.title.clone(),
            price: product.price,
            image: product.image.clone(),
        }
    }
}

impl From<WishlistItem> for CartLine {
    fn from(item: WishlistItem) -> Self {
        Self {
            product_id: item.product_id,
            title: item.title,
            price: item.price,
            image: item.image,
            quantity: 1,
        }
    }
}
