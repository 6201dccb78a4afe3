use diesel::mysql::MysqlConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

pub type MysqlPool = Pool<ConnectionManager<MysqlConnection>>;
pub type MysqlPooledConnection = PooledConnection<ConnectionManager<MysqlConnection>>;

pub fn build_pool(dsn: &str) -> Result<MysqlPool, r2d2::Error> {
    let manager = ConnectionManager::<MysqlConnection>::new(dsn);
    Pool::builder().max_size(10).build(manager)
}
