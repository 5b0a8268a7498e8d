pub mod friendship {
    pub mod repository;
    pub mod repository_redis;
    pub mod service;
}

pub mod interaction {
    pub mod model;
    pub mod repository;
    pub mod repository_redis;
    pub mod service;
}

pub mod recovery {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod service;
    pub mod handle;
    pub mod route;
}

pub mod rebuild {
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod service;
    pub mod handle;
    pub mod route;
}
