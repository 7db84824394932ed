//! SeaORM entity models
//!
//! Database entities for FoodDrop

mod user;
mod profile;
mod session;
mod restaurant;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use profile::{
    Entity as ProfileEntity,
    Model as Profile,
    ActiveModel as ProfileActiveModel,
    Column as ProfileColumn,
};

pub use session::{
    Entity as SessionEntity,
    Model as Session,
    ActiveModel as SessionActiveModel,
    Column as SessionColumn,
};

pub use restaurant::{
    Entity as RestaurantEntity,
    Model as Restaurant,
    ActiveModel as RestaurantActiveModel,
    Column as RestaurantColumn,
};
