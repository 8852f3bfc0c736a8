#![cfg(feature = "sqlite")]

mod common;

use common::{Patient, Physician, Post, User, seed_blog, seed_clinic, session};
use rowmodel::prelude::*;

#[test]
fn sqlite_to_many_and_to_one_resolve_through_keys() {
    let mut s = session();
    seed_blog(&mut s);

    let user = s.find::<User>(3).unwrap();
    let posts = user.load_many::<Post, _>(&s, "posts").unwrap();
    assert_eq!(posts.len(), 10);
    assert!(posts.iter().all(|p| p.user_id == Some(3)));

    let owner = posts[0].load_one::<User, _>(&s, "user").unwrap().unwrap();
    assert_eq!(owner.id(), user.id());

    let scoped = user
        .association::<Post>("posts")
        .unwrap()
        .scope("with_caption_including", &[Value::from(7)]);
    assert_eq!(scoped.ids(&s).unwrap(), vec![28]);
}

#[test]
fn sqlite_create_child_sets_foreign_key() {
    let mut s = session();
    let user = s.create_strict(User::named("ann")).unwrap();

    let post = s.create_child(&user, "posts", Post::named("hello")).unwrap();
    assert!(post.is_persisted());
    assert_eq!(post.user_id, user.id());

    let unsaved = Record::new(User::named("bob"));
    let err = s
        .create_child(&unsaved, "posts", Post::named("orphan"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn sqlite_assign_links_to_one_target() {
    let mut s = session();
    let user = s.create_strict(User::named("ann")).unwrap();

    let mut post = Record::new(Post::named("linked"));
    post.assign("user", &user).unwrap();
    s.save_strict(&mut post).unwrap();

    let reloaded = s.find::<Post>(post.id().unwrap()).unwrap();
    assert_eq!(reloaded.user_id, user.id());
}

#[test]
fn sqlite_through_associations_follow_the_join_model() {
    let mut s = session();
    let physicians = seed_clinic(&mut s);

    let names: Vec<String> = physicians[0]
        .association::<Patient>("patients")
        .unwrap()
        .pluck(&s, "name")
        .unwrap();
    assert_eq!(names, vec!["ann", "bob", "ann"]);

    let unique = physicians[0]
        .load_many::<Patient, _>(&s, "unique_patients")
        .unwrap();
    assert_eq!(unique.len(), 2);

    let bob = s.find::<Patient>(2).unwrap();
    let seen_by = bob.load_many::<Physician, _>(&s, "physicians").unwrap();
    assert_eq!(
        seen_by.iter().map(|p| p.id()).collect::<Vec<_>>(),
        vec![Some(1), Some(2)]
    );
}

#[test]
fn sqlite_includes_preload_without_lazy_loads() {
    let mut s = session();
    seed_blog(&mut s);

    let posts = s.query::<Post>().limit(5).all(&s).unwrap();
    for post in &posts {
        post.load_one::<User, _>(&s, "user").unwrap();
    }
    assert_eq!(s.lazy_load_count("posts", "user"), 5);
    assert_eq!(s.n1_stats().potential_n1, 1);

    s.reset_n1();
    let posts = s
        .query::<Post>()
        .limit(5)
        .includes("user")
        .all(&s)
        .unwrap();
    assert!(posts.iter().all(|p| p.is_loaded("user")));
    let owners: Vec<_> = posts
        .iter()
        .map(|p| p.load_one::<User, _>(&s, "user").unwrap().unwrap().id())
        .collect();
    assert_eq!(owners, vec![Some(1); 5]);
    assert_eq!(s.lazy_load_count("posts", "user"), 0);
}

#[test]
fn sqlite_includes_through_association_groups_by_owner() {
    let mut s = session();
    seed_clinic(&mut s);

    let physicians = s
        .query::<Physician>()
        .includes("unique_patients")
        .all(&s)
        .unwrap();
    let counts: Vec<usize> = physicians
        .iter()
        .map(|p| p.load_many::<Patient, _>(&s, "unique_patients").unwrap().len())
        .collect();
    assert_eq!(counts, vec![2, 1]);

    let err = s.query::<Physician>().includes("nurses").all(&s).unwrap_err();
    assert!(matches!(err, Error::Query(_)));
}

#[test]
fn sqlite_declared_through_chains_are_consistent() {
    assert!(rowmodel::validate_relationships::<Physician>().is_ok());
    assert!(rowmodel::validate_relationships::<Patient>().is_ok());
    assert!(rowmodel::validate_relationships::<User>().is_ok());
}
