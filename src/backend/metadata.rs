use pgrx::prelude::*;

// Catalog tables, created with the extension
extension_sql!(
    r"
    CREATE SCHEMA IF NOT EXISTS distobj;

    CREATE TABLE IF NOT EXISTS distobj.pg_dist_object (
        kind TEXT NOT NULL,
        qualified_name TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (kind, qualified_name)
    );

    CREATE TABLE IF NOT EXISTS distobj.pg_dist_node (
        nodeid SERIAL PRIMARY KEY,
        nodename TEXT NOT NULL,
        nodeport INTEGER NOT NULL DEFAULT 5432,
        isactive BOOLEAN NOT NULL DEFAULT TRUE,
        noderole TEXT NOT NULL DEFAULT 'primary',
        UNIQUE (nodename, nodeport)
    );

    COMMENT ON TABLE distobj.pg_dist_object IS 'Objects known to exist on every worker';
    COMMENT ON TABLE distobj.pg_dist_node IS 'Worker nodes receiving propagated objects';

    -- dblink_connect raises on failure; report the message instead so the
    -- caller can turn it into a node-level error
    CREATE OR REPLACE FUNCTION distobj.try_connect(conn_name TEXT, conn_str TEXT)
    RETURNS TEXT
    LANGUAGE plpgsql
    AS $$
    BEGIN
        PERFORM dblink_connect(conn_name, conn_str);
        RETURN NULL;
    EXCEPTION WHEN OTHERS THEN
        RETURN SQLERRM;
    END
    $$;
    ",
    name = "create_metadata_tables",
    bootstrap,
);
