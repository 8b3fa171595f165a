use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::migrate::Migrator;
use std::str::FromStr;
use crate::auth::hash_password;
use crate::tables::users::{self, Role};

// maps a type with Display + FromStr onto a TEXT column
#[macro_export]
macro_rules! impl_sqlx_text_type_encode_decode {
    ($type:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $type {
            fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
                // TEXT columns only
                <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
            fn compatible(ty: &<sqlx::Sqlite as sqlx::Database>::TypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $type {
            fn encode_by_ref(&self, buf: &mut <sqlx::Sqlite as sqlx::Database>::ArgumentBuffer<'q>) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <String as sqlx::Encode<'q, sqlx::Sqlite>>::encode(self.to_string(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $type {
            fn decode(value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let value = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(value.parse::<$type>()?)
            }
        }
    };
}

static MIGRATOR: Migrator = sqlx::migrate!("db/migrations");

pub struct DbPool(pub SqlitePool);

pub async fn open_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

async fn ensure_admin(pool: &SqlitePool, email: &str, password: &str) -> anyhow::Result<()> {
    let admins: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role=?")
        .bind(Role::Administrator)
        .fetch_one(pool)
        .await?;
    if admins.0 > 0 {
        return Ok(());
    }
    let user_id = users::insert_user(pool, email, &hash_password(password), Role::Administrator).await?;
    warn!("No administrator found, created bootstrap administrator {email} (user id: {user_id})");
    Ok(())
}

pub struct DbPoolFairing();
#[rocket::async_trait]
impl Fairing for DbPoolFairing {
    fn info(&self) -> Info {
        Info {
            name: "SQLite Database Pool with Migrations",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let figment = rocket.figment();
        let database_url = figment.extract_inner::<String>("database_url")
            .unwrap_or_else(|_| "sqlite://gym.db".to_string());
        let admin_email = figment.extract_inner::<String>("admin_email")
            .unwrap_or_else(|_| "admin@gym.local".to_string());
        let admin_password = figment.extract_inner::<String>("admin_password").ok();

        info!("Opening database: {database_url}");
        let pool = match open_pool(&database_url).await {
            Ok(pool) => pool,
            Err(err) => {
                error!("Database open error: {:?}", err);
                return Err(rocket);
            }
        };
        info!("Migrations applied successfully!");

        let Some(admin_password) = admin_password else {
            error!("admin_password is not configured");
            return Err(rocket);
        };
        if let Err(err) = ensure_admin(&pool, &admin_email, &admin_password).await {
            error!("Bootstrap administrator error: {:?}", err);
            return Err(rocket);
        }

        Ok(rocket.manage(DbPool(pool)))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use sqlx::SqlitePool;
    use crate::gymdatetime::GymDateTime;
    use crate::tables::users::Role;

    pub(crate) async fn memory_pool() -> SqlitePool {
        super::open_pool("sqlite::memory:").await.expect("in-memory database")
    }

    pub(crate) async fn add_member(pool: &SqlitePool, email: &str) -> i64 {
        let user_id = crate::tables::users::insert_user(pool, email, "x", Role::Member).await.unwrap();
        let id: (i64,) = sqlx::query_as("INSERT INTO members (user_id, name) VALUES (?, ?) RETURNING id")
            .bind(user_id)
            .bind(email)
            .fetch_one(pool).await.unwrap();
        id.0
    }

    pub(crate) async fn add_instructor(pool: &SqlitePool, email: &str) -> i64 {
        let user_id = crate::tables::users::insert_user(pool, email, "x", Role::Instructor).await.unwrap();
        let id: (i64,) = sqlx::query_as("INSERT INTO instructors (user_id, name) VALUES (?, ?) RETURNING id")
            .bind(user_id)
            .bind(email)
            .fetch_one(pool).await.unwrap();
        id.0
    }

    pub(crate) async fn add_class(pool: &SqlitePool, instructor_id: i64, start_time: GymDateTime, max_capacity: i64) -> i64 {
        let id: (i64,) = sqlx::query_as("INSERT INTO classes (name, kind, instructor_id, facility_id, start_time, duration_min, max_capacity)
            VALUES ('Spinning', 'Cardio', ?, 1, ?, 45, ?) RETURNING id")
            .bind(instructor_id)
            .bind(start_time)
            .bind(max_capacity)
            .fetch_one(pool).await.unwrap();
        id.0
    }

    #[rocket::async_test]
    async fn migrations_seed_facilities() {
        let pool = memory_pool().await;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM facilities")
            .fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 3);
    }

    #[rocket::async_test]
    async fn bootstrap_admin_is_created_once() {
        let pool = memory_pool().await;
        super::ensure_admin(&pool, "boss@gym.local", "secret1").await.unwrap();
        super::ensure_admin(&pool, "other@gym.local", "secret2").await.unwrap();
        let admins: Vec<(String,)> = sqlx::query_as("SELECT email FROM users WHERE role='Administrator'")
            .fetch_all(&pool).await.unwrap();
        assert_eq!(admins, vec![("boss@gym.local".to_string(),)]);
    }
}
