mod mongo_store;
mod redis_store;
mod traits;

pub use mongo_store::MongoObjectStore;
pub use redis_store::RedisSetStore;
pub use traits::{Entity, EntityType, ObjectStore, SetStore};
