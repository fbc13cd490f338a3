/// Ownership and visibility rules
///
/// Every gated resource exposes an owner and a visibility. Reads of a
/// private resource by anyone but its owner report NotFound so existence
/// does not leak; writes by a non-owner report Forbidden.
use crate::{
    db::models::{Account, Comment, Media, Post, Privacy},
    error::{ApiError, ApiResult},
};

pub trait OwnedResource {
    fn owner_id(&self) -> i64;

    fn visibility(&self) -> Privacy;

    fn is_owned_by(&self, account_id: i64) -> bool {
        self.owner_id() == account_id
    }
}

impl OwnedResource for Post {
    fn owner_id(&self) -> i64 {
        self.author_id
    }

    fn visibility(&self) -> Privacy {
        self.privacy
    }
}

/// A comment seen through its post: readable when the post is, editable by its author
pub struct PostComment<'a> {
    pub post: &'a Post,
    pub comment: &'a Comment,
}

impl OwnedResource for PostComment<'_> {
    fn owner_id(&self) -> i64 {
        self.comment.author_id
    }

    fn visibility(&self) -> Privacy {
        self.post.privacy
    }

    fn is_owned_by(&self, account_id: i64) -> bool {
        self.comment.author_id == account_id
    }
}

/// Media attachment: private to its uploader and the post author
pub struct PostMedia<'a> {
    pub post: &'a Post,
    pub media: &'a Media,
}

impl OwnedResource for PostMedia<'_> {
    fn owner_id(&self) -> i64 {
        self.media.uploaded_by
    }

    fn visibility(&self) -> Privacy {
        Privacy::Private
    }

    fn is_owned_by(&self, account_id: i64) -> bool {
        self.media.uploaded_by == account_id || self.post.author_id == account_id
    }
}

pub fn can_access<R: OwnedResource + ?Sized>(account: &Account, resource: &R) -> bool {
    resource.visibility() == Privacy::Public || resource.is_owned_by(account.id)
}

pub fn can_modify<R: OwnedResource + ?Sized>(account: &Account, resource: &R) -> bool {
    resource.is_owned_by(account.id)
}

/// Fail with NotFound unless the account may read the resource
pub fn ensure_readable<R: OwnedResource + ?Sized>(
    account: &Account,
    resource: &R,
    what: &str,
) -> ApiResult<()> {
    if can_access(account, resource) {
        Ok(())
    } else {
        tracing::debug!("Account {} denied read of private {}", account.id, what);
        Err(ApiError::NotFound(format!("{} not found", what)))
    }
}

/// Fail with Forbidden unless the account may modify the resource
pub fn ensure_modifiable<R: OwnedResource + ?Sized>(account: &Account, resource: &R) -> ApiResult<()> {
    if can_modify(account, resource) {
        Ok(())
    } else {
        tracing::debug!("Account {} denied write to resource owned by {}", account.id, resource.owner_id());
        Err(ApiError::Forbidden(
            "You do not have permission to perform this action.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(id: i64) -> Account {
        Account {
            id,
            email: format!("user{}@example.com", id),
            username: None,
            password_hash: None,
            email_verified: false,
            is_active: true,
            is_staff: false,
            created_at: Utc::now(),
        }
    }

    fn post(author_id: i64, privacy: Privacy) -> Post {
        Post {
            id: 1,
            author_id,
            title: String::new(),
            content: "hello".to_string(),
            privacy,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_private_post_reads_as_not_found() {
        let alice = account(1);
        let bob = account(2);
        let private = post(alice.id, Privacy::Private);

        assert!(ensure_readable(&alice, &private, "Post").is_ok());
        assert!(matches!(
            ensure_readable(&bob, &private, "Post"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_public_post_readable_but_not_writable() {
        let alice = account(1);
        let bob = account(2);
        let public = post(alice.id, Privacy::Public);

        assert!(can_access(&bob, &public));
        assert!(!can_modify(&bob, &public));
        assert!(matches!(
            ensure_modifiable(&bob, &public),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ensure_modifiable(&alice, &public).is_ok());
    }

    #[test]
    fn test_staff_get_no_override() {
        let mut staff = account(3);
        staff.is_staff = true;
        let private = post(1, Privacy::Private);
        assert!(!can_access(&staff, &private));
    }

    #[test]
    fn test_comment_follows_post_visibility() {
        let alice = account(1);
        let bob = account(2);
        let public = post(alice.id, Privacy::Public);
        let comment = Comment {
            id: 1,
            post_id: public.id,
            author_id: bob.id,
            parent_id: None,
            text: "nice".to_string(),
            created_at: Utc::now(),
        };
        let scoped = PostComment {
            post: &public,
            comment: &comment,
        };

        assert!(can_access(&alice, &scoped));
        // The post author does not own other people's comments
        assert!(!can_modify(&alice, &scoped));
        assert!(can_modify(&bob, &scoped));
    }

    #[test]
    fn test_media_visible_to_uploader_and_post_author_only() {
        let alice = account(1);
        let bob = account(2);
        let carol = account(3);
        let public = post(alice.id, Privacy::Public);
        let media = Media {
            id: 1,
            post_id: public.id,
            uploaded_by: bob.id,
            file_path: "posts/1/a.png".to_string(),
            content_type: "image/png".to_string(),
            size: 10,
            width: None,
            height: None,
            created_at: Utc::now(),
        };
        let scoped = PostMedia {
            post: &public,
            media: &media,
        };

        assert!(can_access(&alice, &scoped));
        assert!(can_access(&bob, &scoped));
        assert!(!can_access(&carol, &scoped));
    }
}
