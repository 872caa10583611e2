//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;
pub mod coupon;
pub mod abandoned_cart;

pub use product::{Attributes, NewProduct, Product, ProductError, ProductImage, ProductRecord, Variant};
pub use order::{
    AppliedDiscount, GatewayDetails, Order, OrderError, OrderItem, OrderRecord, OrderStatus, PaymentMethod,
    PaymentResult, PaymentStatus, ShippingAddress, TransitionPolicy,
};
pub use cart::{Cart, CartError, CartLine};
pub use user::{Address, AddressError, Role, User, UserRecord};
pub use coupon::{Coupon, CouponError, CouponRecord, DiscountType, NewCoupon};
pub use abandoned_cart::{AbandonedCart, AbandonedCartRecord, AbandonedLine, AbandonedStatus};
