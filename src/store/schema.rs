pub const SCHEMA: &str = r#"
-- Platform users; identities are matched against email and hosting login
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT,
    hosting_username TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Projects map one-to-one onto a hosting repository
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    owner_id TEXT NOT NULL REFERENCES users(id),
    repository TEXT,              -- "owner/name", NULL = not configured
    created_at TEXT DEFAULT (datetime('now'))
);

-- Collaboration agreements; only 'active' ones take part in attribution
CREATE TABLE IF NOT EXISTS agreements (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS agreement_participants (
    agreement_id TEXT NOT NULL REFERENCES agreements(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    PRIMARY KEY (agreement_id, user_id)
);

-- Branches, owned by the author of their oldest commit
CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    branch_name TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES users(id),
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(project_id, branch_name, user_id)
);

-- Commits are keyed by sha across the whole system, not per branch
CREATE TABLE IF NOT EXISTS commits (
    commit_sha TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
    raw_author TEXT NOT NULL,
    message TEXT NOT NULL DEFAULT '',

    -- Diff stats; all zero/empty until fetched in full
    lines_added INTEGER NOT NULL DEFAULT 0,
    lines_removed INTEGER NOT NULL DEFAULT 0,
    changed_files TEXT NOT NULL DEFAULT '[]',  -- JSON array
    stats_fetched INTEGER NOT NULL DEFAULT 0,  -- 1 once read from the commit detail

    commit_date TEXT NOT NULL,
    agreement_id TEXT REFERENCES agreements(id) ON DELETE SET NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Many-to-many relationship between branches and commits
CREATE TABLE IF NOT EXISTS branch_commits (
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    commit_sha TEXT NOT NULL REFERENCES commits(commit_sha) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (branch_id, commit_sha)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_projects_owner ON projects(owner_id);
CREATE INDEX IF NOT EXISTS idx_agreements_project ON agreements(project_id, status);
CREATE INDEX IF NOT EXISTS idx_agreement_participants_user ON agreement_participants(user_id);
CREATE INDEX IF NOT EXISTS idx_branches_project ON branches(project_id, branch_name);
CREATE INDEX IF NOT EXISTS idx_commits_project_date ON commits(project_id, commit_date);
CREATE INDEX IF NOT EXISTS idx_commits_unfetched ON commits(project_id, stats_fetched, commit_date);
CREATE INDEX IF NOT EXISTS idx_branch_commits_sha ON branch_commits(commit_sha);
"#;
