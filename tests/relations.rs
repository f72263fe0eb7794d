mod common;

use anyhow::Result;
use common::{Score, User};
use rust_sqlite_orm::{set_parent, CascadeMode, Dao, Database, Error, Model, SqliteConfig};

fn user_with_scores(name: &str, highscores: &[i32]) -> User {
    let mut user = User::named(name);
    for highscore in highscores {
        user.scores.add(Score::with_highscore(*highscore));
    }
    user
}

#[test]
fn saving_a_parent_cascades_to_its_children() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Fernando Palha", &[123456, 3456789]);
    assert_eq!(user.id(), None);
    users.save(&mut user)?;

    assert_eq!(user.id(), Some(1));
    let ids: Vec<_> = user.scores.iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![Some(1), Some(2)]);
    assert!(user.scores.iter().all(|s| s.user_id() == 1));

    let all_users = users.query_all()?;
    assert_eq!(all_users.len(), 1);
    assert_eq!(all_users[0].name(), "Fernando Palha");

    let mut loaded = all_users.into_iter().next().unwrap();
    assert!(loaded.scores.is_empty());
    let fetched: Vec<Score> = users.fetch_children(&mut loaded, "scores")?;
    let highscores: Vec<_> = fetched.iter().map(Score::highscore).collect();
    assert_eq!(highscores, vec![123456, 3456789]);
    assert!(fetched.iter().all(|s| s.user_id() == 1));
    assert_eq!(loaded.scores.len(), 2);

    assert_eq!(scores.query_all()?.len(), 2);
    Ok(())
}

#[test]
fn resaving_does_not_duplicate_parent_or_children() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Ana", &[10, 20]);
    users.save(&mut user)?;
    user.set_name("Ana Maria");
    users.save(&mut user)?;

    let stored = users.query_all()?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name(), "Ana Maria");
    assert_eq!(scores.query_all()?.len(), 2);
    Ok(())
}

#[test]
fn removing_a_parent_removes_every_stored_child() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut doomed = user_with_scores("Doomed", &[1, 2, 3]);
    users.save(&mut doomed)?;
    let mut kept = user_with_scores("Kept", &[4]);
    users.save(&mut kept)?;

    // Cascade uses storage, so children dropped from memory still go.
    doomed.scores.clear();
    users.remove(&doomed)?;

    assert!(scores.query_by_parent(&doomed)?.is_empty());
    assert!(users.query_by_field("id", doomed.id().unwrap())?.is_none());
    assert_eq!(scores.query_all()?.len(), 1);
    assert_eq!(users.query_all()?.len(), 1);
    Ok(())
}

#[test]
fn removing_an_unsaved_record_is_a_no_op() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    users.remove(&User::named("ghost"))?;
    assert!(users.query_all()?.is_empty());
    Ok(())
}

#[test]
fn fetch_replaces_in_memory_children() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;

    let mut user = user_with_scores("Refresh", &[5]);
    users.save(&mut user)?;
    user.scores.add(Score::with_highscore(6));
    assert_eq!(user.scores.len(), 2);

    let fetched: Vec<Score> = users.fetch_children(&mut user, "scores")?;
    assert_eq!(fetched.len(), 1);
    assert_eq!(user.scores.len(), 1);
    assert_eq!(user.scores.get()[0].highscore(), 5);
    Ok(())
}

#[test]
fn fetch_of_an_unknown_relation_fails() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    let mut user = User::named("x");
    let err = users
        .fetch_children::<Score>(&mut user, "trophies")
        .unwrap_err();
    assert!(matches!(err, Error::UnknownRelation { .. }));
    Ok(())
}

#[test]
fn belongs_to_accessor_follows_the_foreign_key() -> Result<()> {
    let db = Database::open_in_memory()?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut orphan = Score::with_highscore(99);
    assert!(scores.parent::<User>(&orphan)?.is_none());
    scores.save(&mut orphan)?;
    assert!(scores.parent::<User>(&orphan)?.is_none());

    let mut owner = User::named("Owner");
    users.save(&mut owner)?;
    set_parent(&mut orphan, &owner)?;
    scores.save(&mut orphan)?;

    let parent = scores.parent::<User>(&orphan)?.expect("parent is stored");
    assert!(parent.record().same_identity(owner.record()));
    assert_eq!(parent.name(), "Owner");

    let children = scores.query_by_parent(&owner)?;
    assert_eq!(children.len(), 1);
    assert!(children[0].record().same_identity(orphan.record()));
    Ok(())
}

#[test]
fn dangling_foreign_key_yields_no_parent() -> Result<()> {
    let db = Database::open_in_memory()?;
    let scores = Dao::<Score>::new(&db)?;

    let mut score = Score::with_highscore(1);
    score.record_mut().set("user_id", 404i64)?;
    scores.save(&mut score)?;
    assert!(scores.parent::<User>(&score)?.is_none());
    Ok(())
}

fn reject_large_scores(db: &Database) -> Result<()> {
    Dao::<Score>::new(db)?;
    db.execute(
        "CREATE TRIGGER reject_large BEFORE INSERT ON scores \
         WHEN NEW.highscore > 1000 BEGIN SELECT RAISE(ABORT, 'too large'); END;",
    )?;
    Ok(())
}

#[test]
fn best_effort_cascade_keeps_partial_writes() -> Result<()> {
    let db = Database::open_in_memory()?;
    reject_large_scores(&db)?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Partial", &[10, 5000]);
    let err = users.save(&mut user).unwrap_err();
    assert!(matches!(err, Error::Sqlite(_)));

    assert_eq!(user.id(), Some(1));
    assert_eq!(users.query_all()?.len(), 1);
    assert_eq!(scores.query_all()?.len(), 1);
    Ok(())
}

#[test]
fn atomic_cascade_rolls_back_everything() -> Result<()> {
    let config = SqliteConfig::default().with_cascade(CascadeMode::Atomic);
    let db = Database::open(config)?;
    reject_large_scores(&db)?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Atomic", &[10, 5000]);
    assert!(users.save(&mut user).is_err());

    assert_eq!(user.id(), None);
    assert!(users.query_all()?.is_empty());
    assert!(scores.query_all()?.is_empty());
    assert!(db.connection().is_autocommit());

    let mut fine = user_with_scores("Fine", &[10, 20]);
    users.save(&mut fine)?;
    assert_eq!(scores.query_by_parent(&fine)?.len(), 2);

    users.remove(&fine)?;
    assert!(scores.query_all()?.is_empty());
    Ok(())
}

fn atomic_database() -> Result<Database> {
    Ok(Database::open(
        SqliteConfig::default().with_cascade(CascadeMode::Atomic),
    )?)
}

fn keep_users(db: &Database) -> Result<()> {
    db.execute(
        "CREATE TRIGGER keep_users BEFORE DELETE ON users \
         BEGIN SELECT RAISE(ABORT, 'users are kept'); END;",
    )?;
    Ok(())
}

#[test]
fn rolled_back_remove_forgets_tables_it_created() -> Result<()> {
    let db = atomic_database()?;
    let users = Dao::<User>::new(&db)?;
    db.execute("INSERT INTO users (name) VALUES ('Imported')")?;
    keep_users(&db)?;

    let imported = users.query_first()?.expect("inserted row");
    assert!(!db.is_provisioned::<Score>());
    assert!(matches!(users.remove(&imported), Err(Error::Sqlite(_))));

    assert!(!db.is_provisioned::<Score>());
    assert!(db.connection().is_autocommit());
    let scores = Dao::<Score>::new(&db)?;
    assert!(db.is_provisioned::<Score>());
    assert!(scores.query_all()?.is_empty());
    assert_eq!(users.query_all()?.len(), 1);
    Ok(())
}

#[test]
fn rolled_back_remove_restores_deleted_children() -> Result<()> {
    let db = atomic_database()?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Kept", &[1, 2, 3]);
    users.save(&mut user)?;
    keep_users(&db)?;

    assert!(users.remove(&user).is_err());
    assert_eq!(scores.query_by_parent(&user)?.len(), 3);
    assert_eq!(users.query_all()?.len(), 1);
    Ok(())
}

#[test]
fn retry_after_rolled_back_save_leaves_other_rows_alone() -> Result<()> {
    let db = atomic_database()?;
    reject_large_scores(&db)?;
    let users = Dao::<User>::new(&db)?;
    let scores = Dao::<Score>::new(&db)?;

    let mut user = user_with_scores("Retry", &[10, 5000]);
    assert!(users.save(&mut user).is_err());
    assert_eq!(user.id(), None);
    assert!(user.scores.iter().all(|s| s.id().is_none()));
    assert!(user.scores.iter().all(|s| s.user_id() == -1));

    let mut bystander = Score::with_highscore(777);
    scores.save(&mut bystander)?;

    user.scores.get_mut().retain(|s| s.highscore() <= 1000);
    users.save(&mut user)?;

    let stored: Vec<_> = scores.query_all()?.iter().map(Score::highscore).collect();
    assert_eq!(stored, vec![777, 10]);
    assert!(scores.parent::<User>(&bystander)?.is_none());
    let children = scores.query_by_parent(&user)?;
    assert_eq!(children.len(), 1);
    assert!(children[0].record().same_identity(user.scores.get()[0].record()));
    Ok(())
}

#[test]
fn committed_save_keeps_ids_on_later_failure_of_a_resave() -> Result<()> {
    let db = atomic_database()?;
    reject_large_scores(&db)?;
    let users = Dao::<User>::new(&db)?;

    let mut user = user_with_scores("Stable", &[10]);
    users.save(&mut user)?;
    let user_id = user.id();
    let score_id = user.scores.get()[0].id();

    user.scores.add(Score::with_highscore(5000));
    assert!(users.save(&mut user).is_err());

    assert_eq!(user.id(), user_id);
    assert_eq!(user.scores.get()[0].id(), score_id);
    assert_eq!(user.scores.get()[0].user_id(), user_id.unwrap());
    assert_eq!(user.scores.get()[1].id(), None);
    Ok(())
}
