pub mod shares {
    pub const INSERT: &str = r#"
    INSERT INTO shares (
        id
      , name
      , description
      , expiration
      , created_at
    ) VALUES (?, ?, ?, ?, ?)
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT s.id
         , s.name
         , s.description
         , s.expiration
         , s.upload_locked
         , s.is_zip_ready
         , s.views
         , s.removed_reason
         , s.created_at
         , ss.share_id
         , ss.password_hash
         , ss.max_views
      FROM shares AS s
      LEFT JOIN share_security AS ss ON s.id = ss.share_id
     WHERE s.id = ?
    "#;

    pub const CHECK_EXISTS: &str = r#"
    SELECT id
      FROM shares
     WHERE id = ?
    "#;

    pub const UPDATE_DETAILS: &str = r#"
    UPDATE shares
       SET name = COALESCE(?, name)
         , description = COALESCE(?, description)
         , expiration = COALESCE(?, expiration)
     WHERE id = ?
    "#;

    pub const LOCK_UPLOADS: &str = r#"
    UPDATE shares
       SET upload_locked = 1
     WHERE id = ?
       AND upload_locked = 0
    "#;

    pub const REVERT_COMPLETE: &str = r#"
    UPDATE shares
       SET upload_locked = 0
         , is_zip_ready = 0
     WHERE id = ?
    "#;

    pub const SET_ZIP_READY: &str = r#"
    UPDATE shares
       SET is_zip_ready = 1
     WHERE id = ?
       AND upload_locked = 1
    "#;

    pub const INCREMENT_VIEWS: &str = r#"
    UPDATE shares
       SET views = views + 1
     WHERE id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM shares
     WHERE id = ?
    "#;
}

pub mod security {
    pub const INSERT: &str = r#"
    INSERT INTO share_security (
        share_id
      , password_hash
      , max_views
    ) VALUES (?, ?, ?)
    "#;

    pub const UPSERT_PASSWORD: &str = r#"
    INSERT INTO share_security (share_id, password_hash)
    VALUES (?, ?)
    ON CONFLICT (share_id) DO UPDATE
       SET password_hash = excluded.password_hash
    "#;

    pub const UPSERT_MAX_VIEWS: &str = r#"
    INSERT INTO share_security (share_id, max_views)
    VALUES (?, ?)
    ON CONFLICT (share_id) DO UPDATE
       SET max_views = excluded.max_views
    "#;
}

pub mod files {
    pub const INSERT: &str = r#"
    INSERT INTO files (
        id
      , share_id
      , name
    ) VALUES (?, ?, ?)
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , share_id
         , name
         , size
         , is_complete
         , public_token
         , public_token_expires_at
      FROM files
     WHERE id = ?
       AND share_id = ?
    "#;

    pub const SELECT_BY_PUBLIC_TOKEN: &str = r#"
    SELECT id
         , share_id
         , name
         , size
         , is_complete
         , public_token
         , public_token_expires_at
      FROM files
     WHERE public_token = ?
    "#;

    pub const SELECT_ALL_FOR_SHARE: &str = r#"
    SELECT id
         , share_id
         , name
         , size
         , is_complete
         , public_token
         , public_token_expires_at
      FROM files
     WHERE share_id = ?
     ORDER BY name ASC, id ASC
    "#;

    pub const COUNT_FOR_SHARE: &str = r#"
    SELECT COUNT(*)
         , COALESCE(SUM(CASE WHEN is_complete = 0 THEN 1 ELSE 0 END), 0)
      FROM files
     WHERE share_id = ?
    "#;

    pub const MARK_COMPLETE: &str = r#"
    UPDATE files
       SET size = ?
         , is_complete = 1
     WHERE id = ?
    "#;

    pub const UPDATE_PUBLIC_TOKEN: &str = r#"
    UPDATE files
       SET public_token = ?
         , public_token_expires_at = ?
     WHERE id = ?
       AND share_id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM files
     WHERE id = ?
       AND share_id = ?
    "#;
}

pub mod uploads {
    pub const INSERT: &str = r#"
    INSERT INTO upload_sessions (
        file_id
      , share_id
      , expected_index
      , accumulated_size
    ) VALUES (?, ?, ?, ?)
    "#;

    pub const SELECT_BY_FILE: &str = r#"
    SELECT file_id
         , share_id
         , expected_index
         , accumulated_size
      FROM upload_sessions
     WHERE file_id = ?
       AND share_id = ?
    "#;

    /// Compare-and-set on the expected index: two submissions of the same
    /// index cannot both advance the session.
    pub const ADVANCE: &str = r#"
    UPDATE upload_sessions
       SET expected_index = expected_index + 1
         , accumulated_size = ?
         , updated_at = datetime('now')
     WHERE file_id = ?
       AND expected_index = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM upload_sessions
     WHERE file_id = ?
    "#;
}
